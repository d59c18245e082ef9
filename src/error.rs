use thiserror::Error;

/// Errors that can occur during backplane operations
#[derive(Error, Debug)]
pub enum Error {
    /// Payload kind name is not one of the publishable kinds
    #[error("invalid payload kind {0}")]
    InvalidPayloadKind(String),

    /// Subscription handle wraps no live transport subscription
    #[error("no subscription found")]
    NoSubscriptionFound,

    /// Domain payload or ack record could not be encoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Ack token bytes could not be decoded
    #[error("ack decode error: {0}")]
    AckDecode(String),

    /// Underlying transport rejected a connect, publish, or subscribe call
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type alias for backplane operations
pub type Result<T> = std::result::Result<T, Error>;
