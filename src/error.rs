//! Error types for quarry storage operations.

use thiserror::Error;

/// Result type alias using [`QuarryError`].
pub type Result<T> = std::result::Result<T, QuarryError>;

/// Error types for quarry storage operations.
#[derive(Debug, Error)]
pub enum QuarryError {
    /// General storage/I/O error reported by a disk manager.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Buffer pool errors (invalid configuration, inconsistent state).
    #[error("Buffer pool error: {0}")]
    BufferPoolError(String),

    /// Every frame is pinned and nothing can be evicted.
    #[error("Buffer pool exhausted: all frames are pinned")]
    PoolExhausted,
}
