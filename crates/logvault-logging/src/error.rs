use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to create log file {path}: {reason}")]
    LogFile { path: PathBuf, reason: String },

    #[error("Invalid filter directive '{directive}': {reason}")]
    Filter { directive: String, reason: String },

    #[error("Subscriber already installed: {0}")]
    AlreadyInstalled(String),
}
