//! Error types for Stockings

use thiserror::Error;

/// Main error type for Stockings operations
#[derive(Error, Debug)]
pub enum StockingsError {
    /// The archive name is already pinned to a different publisher key
    #[error("Key mismatch for archive {0}: pinned to a different publisher")]
    KeyMismatch(String),

    /// Signature did not verify against the content and publisher key
    #[error("Bad signature for archive {0}")]
    BadSignature(String),

    /// Update version is not strictly greater than the stored one
    #[error("Stale version for archive {name}: received {received}, stored {stored}")]
    StaleVersion {
        name: String,
        received: String,
        stored: String,
    },

    /// Relay connect/send/receive failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Failure reading or writing persisted artifacts
    #[error("Storage error: {0}")]
    Storage(String),

    /// Frame does not decode into a known message
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Archive was not found in the store
    #[error("Archive not found: {0}")]
    ArchiveNotFound(String),

    /// Archive name cannot be used on disk or on the wire
    #[error("Invalid archive name: {0:?}")]
    InvalidName(String),

    /// Version string is empty or contains forbidden characters
    #[error("Invalid version: {0:?}")]
    InvalidVersion(String),

    /// Identity-related error (keys, sealing)
    #[error("Identity error: {0}")]
    Identity(String),

    /// No identity with that name has been initialized
    #[error("Identity not found: {0} (run `stockings init` first)")]
    IdentityNotFound(String),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<postcard::Error> for StockingsError {
    fn from(err: postcard::Error) -> Self {
        StockingsError::Serialization(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for StockingsError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        StockingsError::Transport(err.to_string())
    }
}

impl From<url::ParseError> for StockingsError {
    fn from(err: url::ParseError) -> Self {
        StockingsError::Transport(format!("Invalid relay URL: {}", err))
    }
}

impl StockingsError {
    /// Whether this error is a reconciler rejection (logged and dropped,
    /// never fatal to a session).
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            StockingsError::KeyMismatch(_)
                | StockingsError::BadSignature(_)
                | StockingsError::StaleVersion { .. }
                | StockingsError::MalformedMessage(_)
        )
    }
}

/// Result type alias using StockingsError
pub type StockingsResult<T> = Result<T, StockingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StockingsError::ArchiveNotFound("foo".to_string());
        assert_eq!(format!("{}", err), "Archive not found: foo");

        let err = StockingsError::StaleVersion {
            name: "foo".to_string(),
            received: "1".to_string(),
            stored: "2".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "Stale version for archive foo: received 1, stored 2"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: StockingsError = io_err.into();
        assert!(matches!(err, StockingsError::Io(_)));
        assert!(!err.is_rejection());
    }

    #[test]
    fn test_rejections() {
        assert!(StockingsError::KeyMismatch("a".into()).is_rejection());
        assert!(StockingsError::BadSignature("a".into()).is_rejection());
        assert!(StockingsError::MalformedMessage("a".into()).is_rejection());
        assert!(!StockingsError::Transport("down".into()).is_rejection());
        assert!(!StockingsError::Storage("disk".into()).is_rejection());
    }
}
