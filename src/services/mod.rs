// Service layer - the chat core behind the presentation surfaces

pub mod chat_normalizer;
pub mod chat_realtime;
pub mod chat_session;
pub mod chat_transport;
pub mod chat_types;
pub mod config;

pub use chat_realtime::WsRealtimeFeed;
pub use chat_session::ChatSession;
pub use chat_transport::ChatTransport;
pub use config::ClientConfig;
