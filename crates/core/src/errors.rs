//! Core error types for the bridge.
//!
//! Remote transport errors live in the connect crate; this module covers the
//! failures that can come out of the local stores and the document model.

use thiserror::Error;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the domain layer.
#[derive(Error, Debug)]
pub enum Error {
    /// A username failed validation. The message is shown to HTTP callers.
    #[error("{0}")]
    InvalidUsername(String),

    #[error("username is taken")]
    UsernameTaken,

    #[error("no credential for user {0}")]
    UnknownUser(String),

    /// Missing or unusable OAuth grant.
    #[error("Credential error: {0}")]
    Credential(String),

    /// The write-through to disk failed. Always fatal to the process.
    #[error("Persistence failed: {0}")]
    Persistence(String),

    /// A document or payload could not be interpreted.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Returns true for errors after which the process must not continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Persistence(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Protocol(err.to_string())
    }
}
