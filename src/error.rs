//! Error types for the network sync layer

use thiserror::Error;

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Sync layer error types
#[derive(Error, Debug)]
pub enum SyncError {
    /// Missing or malformed input, rejected before any network attempt
    #[error("Validation error: {0}")]
    Validation(String),

    /// Request never got a response (connect, timeout, body read)
    #[error("Network error: {0}")]
    Network(String),

    /// Server returned an error
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Response body did not match any recognized shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Durable store error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Location permission denied by the user or platform
    #[error("Location permission denied: {0}")]
    Permission(String),

    /// Location services unavailable on this platform
    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// True for failures of the remote call itself (as opposed to local input or storage)
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_) | SyncError::Server { .. } | SyncError::InvalidResponse(_)
        )
    }
}

#[cfg(feature = "client")]
impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Network(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Storage(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::Config(err.to_string())
    }
}

#[cfg(feature = "native")]
impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        SyncError::Storage(err.to_string())
    }
}
