//! Error types for the compliance engine.

use thiserror::Error;

/// Result type alias for compliance operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by every component of the engine
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed key/salt. Fatal, never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Tamper, wrong key, wrong context or malformed ciphertext.
    /// Never carries any part of the plaintext.
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// Underlying store unreachable or constraint violated
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Subject has no data to export or erase
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored value is not one of the closed enumerations
    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Whether the caller may retry the operation later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Persistence(_))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("row not found".to_string()),
            other => Error::Persistence(other.to_string()),
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Persistence(format!("serialization failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Configuration("encryption key missing".to_string());
        assert!(err.to_string().contains("encryption key missing"));
    }

    #[test]
    fn test_only_persistence_is_retryable() {
        assert!(Error::Persistence("timeout".into()).is_retryable());
        assert!(!Error::Decryption("tag mismatch".into()).is_retryable());
        assert!(!Error::Configuration("bad key".into()).is_retryable());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
