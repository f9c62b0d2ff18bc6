//! Chat session controller: room binding, history load, live feed, and
//! optimistic sends.
//!
//! A session is bound to at most one room at a time. Binding resolves the
//! room, loads history wholesale, then opens the realtime feed; rebinding
//! or unbinding always tears the previous feed down. In-flight async work
//! is guarded by a generation counter: results belonging to a superseded
//! binding are discarded instead of clobbering newer state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

use super::chat_normalizer::normalize;
use super::chat_realtime::{RealtimeFeed, RealtimeSubscription};
use super::chat_transport::ChatTransport;
use super::chat_types::{
    ChatRoom, Message, MessageKind, MessageStatus, OutgoingMessage, RawMessageRecord,
};
use crate::error::{ChatError, Result};
use crate::identity::SessionStore;

/// Lifecycle of a chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No room bound. Legitimate idle state, not an error.
    Unbound,
    ResolvingRoom,
    /// Room known; history loading or live feed not yet open.
    RoomReady,
    Live,
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    room_id: Option<String>,
    room: Option<ChatRoom>,
    messages: Vec<Message>,
    last_error: Option<String>,
    loading: bool,
}

impl Default for SessionInner {
    fn default() -> Self {
        Self {
            state: SessionState::Unbound,
            room_id: None,
            room: None,
            messages: Vec::new(),
            last_error: None,
            loading: false,
        }
    }
}

struct LiveFeed {
    subscription: RealtimeSubscription,
    forward: Option<JoinHandle<()>>,
}

/// One user's view of one chat room.
pub struct ChatSession {
    transport: Arc<ChatTransport>,
    feed: Arc<dyn RealtimeFeed>,
    session_store: Arc<SessionStore>,
    inner: Arc<RwLock<SessionInner>>,
    /// Liveness flag: bumped on every bind/unbind; async results are
    /// committed only when their generation is still current.
    generation: Arc<AtomicU64>,
    live: Mutex<Option<LiveFeed>>,
    temp_seq: AtomicU64,
}

impl ChatSession {
    pub fn new(
        transport: Arc<ChatTransport>,
        feed: Arc<dyn RealtimeFeed>,
        session_store: Arc<SessionStore>,
    ) -> Self {
        Self {
            transport,
            feed,
            session_store,
            inner: Arc::new(RwLock::new(SessionInner::default())),
            generation: Arc::new(AtomicU64::new(0)),
            live: Mutex::new(None),
            temp_seq: AtomicU64::new(1),
        }
    }

    // ── Binding ────────────────────────────────────────────────

    /// Bind directly to a known room ID. Full room details are fetched
    /// best-effort; the ID alone is enough to go live.
    pub async fn bind_room(&self, room_id: &str) -> Result<()> {
        let generation = self.bump_generation();
        self.teardown_live(generation).await;

        {
            let mut inner = self.inner.write().await;
            inner.state = SessionState::ResolvingRoom;
            inner.room_id = Some(room_id.to_string());
            inner.room = None;
            inner.last_error = None;
            inner.loading = true;
        }

        match self.transport.room_by_id(room_id).await {
            Ok(room) => {
                if self.is_current(generation) {
                    self.inner.write().await.room = Some(room);
                }
            }
            Err(e) => {
                log::warn!("Room detail fetch failed for {}: {}", room_id, e);
            }
        }

        self.enter_room(generation, room_id).await
    }

    /// Resolve the room bound to an engagement, then bind to it. Resolution
    /// failure leaves the session unbound with a user-facing error.
    pub async fn bind_engagement(&self, engagement_id: &str) -> Result<()> {
        let generation = self.bump_generation();
        self.teardown_live(generation).await;

        {
            let mut inner = self.inner.write().await;
            inner.state = SessionState::ResolvingRoom;
            inner.room_id = None;
            inner.room = None;
            inner.last_error = None;
            inner.loading = true;
        }

        let summary = match self.transport.room_for_engagement(engagement_id).await {
            Ok(summary) => summary,
            Err(e) => {
                log::warn!("Engagement room resolution failed for {}: {}", engagement_id, e);
                if self.is_current(generation) {
                    let mut inner = self.inner.write().await;
                    inner.state = SessionState::Unbound;
                    inner.loading = false;
                    inner.last_error = Some("Unable to open the engagement chat".to_string());
                }
                return Err(e);
            }
        };

        if !self.is_current(generation) {
            return Ok(());
        }
        self.inner.write().await.room_id = Some(summary.id.clone());

        match self.transport.room_by_id(&summary.id).await {
            Ok(room) => {
                if self.is_current(generation) {
                    self.inner.write().await.room = Some(room);
                }
            }
            Err(e) => {
                log::warn!("Room detail fetch failed for {}: {}", summary.id, e);
            }
        }

        self.enter_room(generation, &summary.id).await
    }

    /// Release the bound room and close the live feed.
    pub async fn unbind(&self) {
        let generation = self.bump_generation();
        self.teardown_live(generation).await;
        *self.inner.write().await = SessionInner::default();
    }

    // ── History + live feed sequencing ─────────────────────────

    async fn enter_room(&self, generation: u64, room_id: &str) -> Result<()> {
        if self.is_current(generation) {
            self.inner.write().await.state = SessionState::RoomReady;
        }

        // History load is authoritative: normalized, sorted, and swapped in
        // wholesale. A load that resolves after a rebind is discarded.
        match self.transport.messages(room_id).await {
            Ok(raw) => {
                let mut messages: Vec<Message> = raw.into_iter().map(normalize).collect();
                messages.sort_by_key(|m| m.sent_at_ms);
                if !self.is_current(generation) {
                    log::debug!("Stale history load for {} discarded", room_id);
                    return Ok(());
                }
                let mut inner = self.inner.write().await;
                inner.messages = messages;
                inner.loading = false;
            }
            Err(e) => {
                log::warn!("History load failed for {}: {}", room_id, e);
                if self.is_current(generation) {
                    let mut inner = self.inner.write().await;
                    inner.loading = false;
                    inner.last_error = Some("Unable to load messages".to_string());
                }
            }
        }

        // Refresh the feed's authorization, then replace any previous
        // subscription with one scoped to this room. The swap happens under
        // the live-slot lock so a concurrent rebind cannot interleave.
        if let Some(token) = self.session_store.bearer_token() {
            if let Err(e) = self.feed.set_auth(&token).await {
                log::warn!("Realtime auth refresh failed: {}", e);
            }
        }

        let mut live = self.live.lock().await;
        if !self.is_current(generation) {
            return Ok(());
        }
        if let Some(prev) = live.take() {
            if let Some(forward) = prev.forward {
                forward.abort();
            }
            self.feed.unsubscribe(prev.subscription).await;
        }

        match self.feed.subscribe(room_id).await {
            Ok(mut subscription) => {
                if !self.is_current(generation) {
                    // Superseded while subscribing: close immediately.
                    self.feed.unsubscribe(subscription).await;
                    return Ok(());
                }
                let forward = subscription
                    .take_events()
                    .map(|events| self.spawn_forward(generation, events));
                *live = Some(LiveFeed {
                    subscription,
                    forward,
                });
                drop(live);
                if self.is_current(generation) {
                    self.inner.write().await.state = SessionState::Live;
                }
            }
            Err(e) => {
                drop(live);
                log::warn!("Realtime subscribe failed for {}: {}", room_id, e);
                if self.is_current(generation) {
                    self.inner.write().await.last_error =
                        Some("Live updates unavailable".to_string());
                }
            }
        }

        Ok(())
    }

    /// Forward normalized feed events into the timeline, dropping
    /// duplicates by ID (an insert we published comes back via the feed).
    fn spawn_forward(
        &self,
        generation: u64,
        mut events: mpsc::UnboundedReceiver<RawMessageRecord>,
    ) -> JoinHandle<()> {
        let inner = self.inner.clone();
        let live_generation = self.generation.clone();
        tokio::spawn(async move {
            while let Some(raw) = events.recv().await {
                if live_generation.load(Ordering::SeqCst) != generation {
                    break;
                }
                let message = normalize(raw);
                let mut state = inner.write().await;
                if state.messages.iter().any(|m| m.id == message.id) {
                    continue;
                }
                state.messages.push(message);
            }
        })
    }

    /// Tear down any live feed, unless this binding has already been
    /// superseded (the newer binding owns the slot then).
    async fn teardown_live(&self, generation: u64) {
        let mut live = self.live.lock().await;
        if !self.is_current(generation) {
            return;
        }
        if let Some(prev) = live.take() {
            if let Some(forward) = prev.forward {
                forward.abort();
            }
            self.feed.unsubscribe(prev.subscription).await;
        }
    }

    // ── Sending ────────────────────────────────────────────────

    /// Optimistic send: append a `sending` placeholder immediately, then
    /// reconcile it by temporary ID once the transport resolves — replaced
    /// in place on success, removed on failure.
    pub async fn send(&self, outgoing: OutgoingMessage) -> Result<Message> {
        let room_id = self
            .inner
            .read()
            .await
            .room_id
            .clone()
            .ok_or(ChatError::NoRoomBound)?;
        let sender_id = self
            .session_store
            .current_user_id()
            .ok_or(ChatError::Unauthenticated)?;

        let temp_id = format!("temp-{}", self.temp_seq.fetch_add(1, Ordering::SeqCst));
        let now = Utc::now();
        let placeholder = Message {
            id: temp_id.clone(),
            sender_id,
            text: outgoing.text.clone().unwrap_or_default(),
            kind: outgoing.kind,
            status: MessageStatus::Sending,
            file_url: outgoing.file_url.clone(),
            file_name: outgoing.file_name.clone(),
            file_size: outgoing.file_size,
            reply_to_message_id: outgoing.reply_to_message_id.clone(),
            sent_at: now,
            sent_at_ms: now.timestamp_millis(),
            edited_at: None,
        };
        self.inner.write().await.messages.push(placeholder);

        match self.transport.send_message(&room_id, &outgoing).await {
            Ok(raw) => {
                let confirmed = normalize(raw);
                let mut inner = self.inner.write().await;
                if let Some(slot) = inner.messages.iter_mut().find(|m| m.id == temp_id) {
                    *slot = confirmed.clone();
                }
                Ok(confirmed)
            }
            Err(e) => {
                let mut inner = self.inner.write().await;
                inner.messages.retain(|m| m.id != temp_id);
                Err(e)
            }
        }
    }

    /// Upload a file and send it as a message, classifying the kind from
    /// its mime type.
    pub async fn send_file(&self, path: &std::path::Path) -> Result<Message> {
        let url = self.transport.upload_file(path).await?;

        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let kind = if mime.essence_str() == "image/gif" {
            MessageKind::Gif
        } else if mime.type_() == mime_guess::mime::IMAGE {
            MessageKind::Image
        } else {
            MessageKind::Document
        };

        let mut outgoing = OutgoingMessage::file(kind, url);
        outgoing.file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string());
        outgoing.file_size = tokio::fs::metadata(path).await.ok().map(|m| m.len());

        self.send(outgoing).await
    }

    /// Mark the room read up to the newest message. Backend capability is
    /// not wired yet; see [`ChatTransport::mark_as_read`].
    pub async fn mark_read(&self) -> Result<()> {
        let (room_id, newest) = {
            let inner = self.inner.read().await;
            let room_id = inner.room_id.clone().ok_or(ChatError::NoRoomBound)?;
            (room_id, inner.messages.last().map(|m| m.id.clone()))
        };
        self.transport
            .mark_as_read(&room_id, newest.as_deref())
            .await
    }

    // ── Queries ────────────────────────────────────────────────

    pub async fn messages(&self) -> Vec<Message> {
        self.inner.read().await.messages.clone()
    }

    pub async fn state(&self) -> SessionState {
        self.inner.read().await.state
    }

    pub async fn room(&self) -> Option<ChatRoom> {
        self.inner.read().await.room.clone()
    }

    pub async fn room_id(&self) -> Option<String> {
        self.inner.read().await.room_id.clone()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.inner.read().await.last_error.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.inner.read().await.loading
    }

    fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        // Subscription close rides on RealtimeSubscription's drop hook.
        if let Ok(mut live) = self.live.try_lock() {
            if let Some(live) = live.take() {
                if let Some(forward) = live.forward {
                    forward.abort();
                }
            }
        }
    }
}
