//! Construction errors for the logging pipeline

use logvault_crash::PreserveError;
use thiserror::Error;

/// A redaction pattern failed to compile
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanitizerError {
    #[error("Invalid pattern '{name}': {reason}")]
    InvalidPattern { name: String, reason: String },
}

/// Failure while assembling a [`Logger`](crate::Logger)
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Sanitizer(#[from] SanitizerError),

    #[error("Crash preserver: {0}")]
    Preserver(#[from] PreserveError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pattern_message() {
        let err = SanitizerError::InvalidPattern {
            name: "token".into(),
            reason: "unclosed group".into(),
        };
        assert_eq!(err.to_string(), "Invalid pattern 'token': unclosed group");

        let build: BuildError = err.into();
        assert!(build.to_string().contains("token"));
    }
}
