//! Store error types.

use thiserror::Error;

/// Errors from the durable config store and its write worker.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem operation failed.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Document could not be serialized or parsed.
    #[error("store document error: {0}")]
    Json(#[from] serde_json::Error),
    /// The background writer thread has exited.
    #[error("config writer is not running")]
    WorkerGone,
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
