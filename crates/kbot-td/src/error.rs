use thiserror::Error;

/// Failure of a single order placement.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrderError {
    /// Network or HTTP-level failure before the venue gave an answer.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("order request timed out after {0} ms")]
    Timeout(u64),

    /// The venue answered with a non-empty `error` array.
    #[error("order rejected: {}", .0.join(", "))]
    Rejected(Vec<String>),

    /// Missing or unusable credentials.
    #[error("auth error: {0}")]
    Auth(String),
}

impl OrderError {
    /// Whether another attempt could succeed. Rejections and auth failures
    /// are final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }
}
