//! Contracts for the collaborators the pipeline delivers to
//!
//! - [`Sink`]: a destination for finalized records
//! - [`Formatter`]: renders a record as text, without side effects

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use async_trait::async_trait;

use crate::error::SinkError;
use crate::record::LogRecord;
use crate::severity::Severity;

/// Destination for finalized log records
///
/// Sinks are shared between the dispatch facade and the application, so the
/// mutable knobs (minimum severity, enabled flag) use interior mutability.
/// [`SinkState`] provides a ready-made implementation of those knobs.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Stable identifier, matched against the disabled-sink configuration
    fn identifier(&self) -> &str;

    fn min_severity(&self) -> Severity;

    fn set_min_severity(&self, severity: Severity);

    fn is_enabled(&self) -> bool;

    fn set_enabled(&self, enabled: bool);

    /// Deliver one record
    async fn log(&self, record: &LogRecord) -> Result<(), SinkError>;

    /// Deliver a batch, in order
    ///
    /// The default hands every record to [`log`](Self::log), even after a
    /// failure, and reports the first error once the batch is done.
    async fn flush(&self, records: &[LogRecord]) -> Result<(), SinkError> {
        let mut first_error = None;
        for record in records {
            if let Err(e) = self.log(record).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Whether this sink wants the record at all
    fn accepts(&self, record: &LogRecord) -> bool {
        self.is_enabled() && record.severity() >= self.min_severity()
    }
}

/// Renders a record as a line of text
pub trait Formatter: Send + Sync {
    fn format(&self, record: &LogRecord) -> String;
}

/// Atomic minimum-severity and enabled flag for sink implementations
#[derive(Debug)]
pub struct SinkState {
    min_severity: AtomicU8,
    enabled: AtomicBool,
}

impl SinkState {
    pub fn new(min_severity: Severity) -> Self {
        Self {
            min_severity: AtomicU8::new(min_severity.as_u8()),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn min_severity(&self) -> Severity {
        Severity::from_u8(self.min_severity.load(Ordering::Relaxed)).unwrap_or_default()
    }

    pub fn set_min_severity(&self, severity: Severity) {
        self.min_severity.store(severity.as_u8(), Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }
}

impl Default for SinkState {
    fn default() -> Self {
        Self::new(Severity::Trace)
    }
}
