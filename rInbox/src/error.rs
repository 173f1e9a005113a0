//! Error types.

use thiserror::Error;

/// The main error type for rInbox operations.
///
/// Ordinary malformed input (bad payloads, corrupt caches) never surfaces
/// here; those degrade to defaults. Errors are reserved for storage
/// failures and input that is not data at all.
#[derive(Debug, Error)]
pub enum Error {
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Durable storage backend failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid argument passed to an API method.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// Create an invalid argument error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}

/// Result type alias for rInbox operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::storage("quota exceeded");
        assert_eq!(format!("{}", e), "Storage error: quota exceeded");
    }

    #[test]
    fn test_json_error_converts() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(Error::from(json_err), Error::Json(_)));
    }
}
