//! Error types for pool operations

/// Errors from pool operations.
///
/// Pool exhaustion is deliberately absent: "no session available" is a
/// normal empty result (`Option::None`), not an error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("health probe failed: {0}")]
    Probe(String),

    #[error("store error: {0}")]
    Store(#[from] session_store::Error),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
