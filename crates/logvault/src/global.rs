//! Process-wide logger handle
//!
//! Set once with [`init`], read with [`get`], wound down with [`shutdown`].
//! Libraries should prefer taking a [`Logger`] explicitly.

use std::sync::OnceLock;

use crate::logger::Logger;

static GLOBAL: OnceLock<Logger> = OnceLock::new();

/// Install the process-wide logger
///
/// Returns the logger back if one was already installed.
pub fn init(logger: Logger) -> Result<(), Logger> {
    GLOBAL.set(logger)
}

pub fn get() -> Option<&'static Logger> {
    GLOBAL.get()
}

pub fn is_initialized() -> bool {
    GLOBAL.get().is_some()
}

/// Stop the global logger's timer, flush and persist
///
/// The handle stays installed; further records are still accepted.
pub async fn shutdown() {
    if let Some(logger) = GLOBAL.get() {
        logger.shutdown().await;
    }
}
