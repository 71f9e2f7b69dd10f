//! Error types for the server core.
//!
//! Mirrors the taxonomy in spec.md §7: every fallible core function
//! returns a `ServerError`; `anyhow` is reserved for the `main` boundary.

use thiserror::Error;

/// Main error type for the key-value server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Malformed frame, size out of range, unknown command code.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Read or delete of an absent record.
    #[error("record not found")]
    NotFound,

    /// putkeep / insert-only PUT on an existing record.
    #[error("record already exists")]
    Conflict,

    /// Storage backend call failed.
    #[error("backend failure: {0}")]
    BackendFailure(String),

    /// Command masked off by the access policy.
    #[error("command forbidden by access mask")]
    Forbidden,

    /// recv/send error on the client or peer socket.
    #[error("transport error")]
    Transport(#[from] std::io::Error),

    /// Follower lost its master connection.
    #[error("replication peer disconnected: {0}")]
    ReplDisconnect(String),

    /// Script extension invocation failed or is unavailable.
    #[error("script error: {0}")]
    Script(String),

    /// Startup/config validation failure. Fatal.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type ServerResult<T> = std::result::Result<T, ServerError>;

impl ServerError {
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn backend<S: Into<String>>(message: S) -> Self {
        Self::BackendFailure(message.into())
    }

    pub fn script<S: Into<String>>(message: S) -> Self {
        Self::Script(message.into())
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration(message.into())
    }

    /// Binary-dialect status byte for this error (§6.1, §7).
    ///
    /// Management-command "forbidden" collapses onto the same code as a
    /// generic backend failure in the original server; that ambiguity is
    /// preserved deliberately rather than fixed (spec.md §9).
    pub fn binary_status(&self) -> u8 {
        match self {
            ServerError::NotFound
            | ServerError::Conflict
            | ServerError::Forbidden
            | ServerError::InvalidInput(_)
            | ServerError::BackendFailure(_)
            | ServerError::Script(_) => 1,
            _ => 1,
        }
    }
}
