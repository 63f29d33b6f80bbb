//! Error types for the remote API clients.

use thiserror::Error;

/// Result type alias for remote API operations.
pub type Result<T> = std::result::Result<T, ConnectError>;

/// Errors that can occur while talking to the remote API.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Transport error, including per-call deadline expiry
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body could not be decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-2xx response from the remote service
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Missing or rejected OAuth grant
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Local store failure while handling a remote result
    #[error(transparent)]
    Core(#[from] ourabridge_core::Error),
}

impl ConnectError {
    /// Create an API error from status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// True when the process must stop; only local persistence failures qualify.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Core(e) if e.is_fatal())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Http(e) if e.is_timeout())
    }
}
