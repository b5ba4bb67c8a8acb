//! # logvault crash
//!
//! Keeps the most recent log records so they survive an abnormal exit.
//!
//! - [`CrashPreserver`]: ring of recent records, JSON snapshot on demand,
//!   crash marker written from the signal path
//! - [`MarkerRegion`]: the memory-mapped marker itself
//! - [`install_crash_handler`]: wire the fatal signals to the preserver
//!   (unix only)
//!
//! ## Example
//!
//! ```rust,ignore
//! let preserver = CrashPreserver::new(PreserverConfig::in_dir("./data/crash"))?;
//! if let Some(recovery) = preserver.recover().await? {
//!     println!("{} records from the last run", recovery.records.len());
//! }
//! ```

pub mod error;
pub mod marker;
pub mod preserver;
#[cfg(unix)]
pub mod signal;

pub use error::PreserveError;
pub use marker::MarkerRegion;
pub use preserver::{
    CrashPreserver, CrashReport, DEFAULT_CAPACITY, PreserverConfig, Recovery, RecoverySource,
};
#[cfg(unix)]
pub use signal::{install_crash_handler, uninstall_crash_handler};
