use std::sync::Arc;

use crate::error::Result;
use crate::identity::SessionStore;
use crate::services::chat_realtime::{RealtimeFeed, WsRealtimeFeed};
use crate::services::chat_session::ChatSession;
use crate::services::chat_transport::ChatTransport;
use crate::services::config::ClientConfig;

/// Composition root wiring the session store, transport, and realtime feed.
pub struct ChatClient {
    config: ClientConfig,
    session_store: Arc<SessionStore>,
    transport: Arc<ChatTransport>,
    feed: Arc<dyn RealtimeFeed>,
}

impl ChatClient {
    /// Build the production wiring: websocket realtime feed, which also
    /// serves as the transport's primary direct-write path.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let session_store = Arc::new(SessionStore::new(&config.session_dir));
        let ws = Arc::new(WsRealtimeFeed::new(config.realtime_url.clone()));
        let transport = Arc::new(
            ChatTransport::new(&config, session_store.clone())?.with_direct_write(ws.clone()),
        );

        Ok(Self {
            config,
            session_store,
            transport,
            feed: ws,
        })
    }

    /// Build from pre-constructed collaborators (tests, custom wiring).
    pub fn with_parts(
        config: ClientConfig,
        session_store: Arc<SessionStore>,
        transport: Arc<ChatTransport>,
        feed: Arc<dyn RealtimeFeed>,
    ) -> Self {
        Self {
            config,
            session_store,
            transport,
            feed,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session_store(&self) -> &Arc<SessionStore> {
        &self.session_store
    }

    pub fn transport(&self) -> &Arc<ChatTransport> {
        &self.transport
    }

    /// Open a new chat session. Sessions start unbound.
    pub fn open_session(&self) -> ChatSession {
        ChatSession::new(
            self.transport.clone(),
            self.feed.clone(),
            self.session_store.clone(),
        )
    }
}
