mod error;
pub mod identity;
pub mod services;
mod state;

pub use error::{ChatError, Result};
pub use identity::SessionStore;
pub use services::chat_normalizer::normalize;
pub use services::chat_realtime::{RealtimeFeed, RealtimeSubscription, WsRealtimeFeed};
pub use services::chat_session::{ChatSession, SessionState};
pub use services::chat_transport::{ChatTransport, DirectWrite};
pub use services::chat_types::{
    ChatRoom, Message, MessageKind, MessageStatus, OutgoingMessage, RawMessageRecord, RoomContext,
    RoomSummary,
};
pub use services::config::ClientConfig;
pub use state::ChatClient;
