//! Error types for logvault-crash
//!
//! Only the normal persistence path returns these. The crash-safe path
//! (`persist_sync` and friends) has no failure mode.

use logvault_core::RingError;
use thiserror::Error;

/// Errors from constructing the preserver or from snapshot I/O
#[derive(Debug, Error)]
pub enum PreserveError {
    /// The ring could not be created
    #[error("Invalid preserver capacity: {0}")]
    InvalidCapacity(#[from] RingError),

    /// Reading or writing the snapshot file failed
    #[error("I/O error: {0}")]
    Io(String),

    /// The snapshot file exists but does not decode
    #[error("Decode error: {0}")]
    Decode(String),

    /// The ring contents could not be encoded
    #[error("Encode error: {0}")]
    Encode(String),

    /// Installing or removing the fatal-signal handlers failed
    #[error("Signal handler error: {0}")]
    Signal(String),
}

impl From<std::io::Error> for PreserveError {
    fn from(err: std::io::Error) -> Self {
        PreserveError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PreserveError {
    fn from(err: serde_json::Error) -> Self {
        PreserveError::Decode(err.to_string())
    }
}

impl From<nix::Error> for PreserveError {
    fn from(err: nix::Error) -> Self {
        PreserveError::Signal(err.to_string())
    }
}

impl PreserveError {
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode(message.into())
    }

    /// Whether the error means "nothing usable was persisted" rather than
    /// an environmental failure
    pub fn is_decode(&self) -> bool {
        matches!(self, PreserveError::Decode(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_error_conversion() {
        let err: PreserveError = RingError::ZeroCapacity.into();
        assert!(matches!(err, PreserveError::InvalidCapacity(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: PreserveError = io_err.into();
        assert!(matches!(err, PreserveError::Io(_)));
        assert!(!err.is_decode());
    }

    #[test]
    fn test_decode_error() {
        let err = PreserveError::decode("truncated");
        assert!(err.is_decode());
        assert!(err.to_string().contains("truncated"));
    }
}
