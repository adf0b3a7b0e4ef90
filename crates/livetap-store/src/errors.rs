//! Error types for buffer, archive, and relay operations.

use thiserror::Error;

/// Session buffer failures.
#[derive(Debug, Error)]
pub enum BufferError {
    /// Redis command or connection failure.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Event could not be encoded.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Archive and session-record failures.
#[derive(Debug, Error)]
pub enum StorageError {
    /// `SQLite` error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Filesystem error preparing the database location.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding of a payload failed.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Which migration failed and why.
        message: String,
    },

    /// A stored timestamp could not be parsed.
    #[error("invalid stored timestamp: {0}")]
    InvalidTimestamp(String),

    /// A blocking storage task panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Task(String),
}

/// Live relay failures.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Redis command or connection failure.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Message could not be encoded.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The subscription stream ended.
    #[error("relay subscription closed")]
    Closed,
}

/// Convenience alias for archive and session-record results.
pub type Result<T> = std::result::Result<T, StorageError>;
