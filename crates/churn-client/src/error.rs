use churn_core::ChurnError;
use thiserror::Error;

/// Every failure the API client can report.
///
/// Cloneable so a failed read can be kept in [`DataState`](crate::DataState)
/// and rendered later.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Missing, expired or rejected credential (HTTP 401/403).
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Transport failure; no response was received.
    #[error("network error: {0}")]
    Network(String),

    /// Non-2xx response, or a 2xx whose body could not be decoded.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Malformed request caught before anything was sent.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Durable storage could not be read or written.
    #[error("storage error: {0}")]
    Storage(String),
}

impl ApiError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, ApiError::Authentication(_))
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }
}

impl From<ChurnError> for ApiError {
    fn from(e: ChurnError) -> Self {
        ApiError::Storage(e.to_string())
    }
}
