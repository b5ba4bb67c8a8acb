//! Error types for logvault-core

use thiserror::Error;

/// Ring construction failure
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingError {
    #[error("Ring capacity must be greater than zero")]
    ZeroCapacity,
}

/// Unrecognised severity name
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown severity: {0}")]
pub struct ParseSeverityError(pub String);

/// Failure reported by a single sink while delivering records
///
/// The dispatch facade logs these and moves on to the next sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Sink I/O error: {0}")]
    Io(String),

    #[error("Sink rejected record: {0}")]
    Rejected(String),

    #[error("Sink error: {0}")]
    Other(String),
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::Io(err.to_string())
    }
}

impl SinkError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let sink_err: SinkError = io_err.into();
        assert!(matches!(sink_err, SinkError::Io(_)));
        assert!(sink_err.to_string().contains("pipe closed"));
    }

    #[test]
    fn test_ring_error_message() {
        assert!(RingError::ZeroCapacity.to_string().contains("greater than zero"));
    }
}
