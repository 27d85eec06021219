//! Error types for session record storage

/// Errors from session record storage.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("record parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("session not found: {0}")]
    NotFound(String),
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;
