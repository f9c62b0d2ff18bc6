use thiserror::Error;

/// Errors surfaced by the chat client core.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The local session has no resolvable user identity.
    #[error("Not signed in")]
    Unauthenticated,

    /// An operation that needs a bound room was invoked on an unbound session.
    #[error("No chat room is bound")]
    NoRoomBound,

    #[error("Room resolution failed: {0}")]
    RoomResolution(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Realtime error: {0}")]
    Realtime(String),

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;
