use thiserror::Error;

/// User-visible error strings carried in `{ kind: "error" }` envelopes.
pub mod client_messages {
    pub const AUTH_REQUIRED: &str = "Authentication required";
    pub const USER_NOT_FOUND: &str = "User not found";
    pub const INVALID_FORMAT: &str = "Invalid message format";
    pub const CONTENT_REQUIRED: &str = "Message content is required";
    pub const TARGET_REQUIRED: &str = "Message must have either recipientUserId or groupId";
    pub const TARGET_CONFLICT: &str = "Message must not have both recipientUserId and groupId";
    pub const INVALID_USER_ID: &str = "Invalid user id";
    pub const STORE_FAILED: &str = "Failed to store message";
    pub const INTERNAL: &str = "Internal server error";
}

/// Errors produced by the chama messaging layer.
#[derive(Debug, Error)]
pub enum ChamaError {
    #[error("codec error: {0}")]
    Codec(String),

    /// Protocol-level validation failure. The payload is the exact string
    /// reported to the client.
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),

    #[error("authentication required")]
    AuthRequired,

    #[error("user not found: {0}")]
    UserNotFound(i64),

    #[error("store error: {0}")]
    Store(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl ChamaError {
    /// The message sent back to the offending client for this error.
    ///
    /// Infrastructure detail (store and transport causes) is never exposed.
    pub fn client_message(&self) -> &'static str {
        match self {
            ChamaError::Codec(_) => client_messages::INVALID_FORMAT,
            ChamaError::InvalidMessage(msg) => *msg,
            ChamaError::AuthRequired => client_messages::AUTH_REQUIRED,
            ChamaError::UserNotFound(_) => client_messages::USER_NOT_FOUND,
            ChamaError::Store(_) => client_messages::STORE_FAILED,
            ChamaError::Transport(_)
            | ChamaError::Config(_)
            | ChamaError::Io(_)
            | ChamaError::Other(_) => client_messages::INTERNAL,
        }
    }
}

impl From<serde_json::Error> for ChamaError {
    fn from(e: serde_json::Error) -> Self {
        ChamaError::Codec(e.to_string())
    }
}

pub type ChamaResult<T> = Result<T, ChamaError>;
