use thiserror::Error;

/// Error kinds shared across the relay pipeline.
///
/// The store and provider layers return these to their callers; the
/// dispatcher captures per-attempt errors inside `PushResult` without
/// aborting siblings, and the relay logs and keeps going.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not connected: {0}")]
    NotConnected(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Transport-level provider failure (network, non-200). Retryable.
    #[error("provider transport error: {0}")]
    ProviderTransport(String),

    /// Per-message rejection from the provider API. Terminal.
    #[error("provider rejected message: {0}")]
    ProviderReject(String),

    #[error("invalid push token: {0}")]
    InvalidToken(String),

    #[error("cancelled")]
    Cancelled,

    #[error("timed out")]
    Timeout,
}

impl RelayError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        RelayError::InvalidArgument(msg.into())
    }

    /// Whether the dispatcher may retry the operation that produced this.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RelayError::ProviderTransport(_))
    }
}

impl From<sled::Error> for RelayError {
    fn from(err: sled::Error) -> Self {
        RelayError::StoreUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::StoreUnavailable(format!("corrupt record: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
