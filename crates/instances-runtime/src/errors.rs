//! Runtime error types.

use instances_settings::SettingsError;
use instances_store::StoreError;

/// Failure of a host-provided session API call.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The API answered but refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),
    /// The request never got an answer.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Errors surfaced by the runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Persistence failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Settings could not be loaded.
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
}

impl RuntimeError {
    /// Error category string for logs.
    pub fn category(&self) -> &str {
        match self {
            Self::Store(_) => "store",
            Self::Settings(_) => "settings",
        }
    }
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
