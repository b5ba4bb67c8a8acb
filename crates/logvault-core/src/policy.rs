//! Buffering and sampling policies
//!
//! Policies are immutable values owned by the component they configure.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::record::LogRecord;
use crate::severity::Severity;

/// When the buffer hands its pending records to the flush handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferPolicy {
    /// Pending count that forces a flush (at least 1)
    pub max_size: usize,
    /// Period of the auto-flush timer; zero disables the timer
    #[serde(with = "crate::config::duration_secs")]
    pub flush_interval: Duration,
    /// Records at or above this severity flush immediately
    pub flush_on: Option<Severity>,
    /// Flush when the host application moves to the background
    pub flush_on_background: bool,
}

impl BufferPolicy {
    pub fn new(
        max_size: usize,
        flush_interval: Duration,
        flush_on: Option<Severity>,
        flush_on_background: bool,
    ) -> Self {
        Self {
            max_size: max_size.max(1),
            flush_interval,
            flush_on,
            flush_on_background,
        }
    }

    /// Unbuffered delivery: every record flushes on its own
    pub fn realtime() -> Self {
        Self::new(1, Duration::ZERO, None, true)
    }

    /// Large batches, long interval
    pub fn battery_saver() -> Self {
        Self::new(200, Duration::from_secs(30), Some(Severity::Error), true)
    }

    /// Whether this record must be flushed without waiting
    pub fn flushes_immediately(&self, severity: Severity) -> bool {
        self.flush_on.is_some_and(|threshold| severity >= threshold)
    }
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self::new(100, Duration::from_secs(5), Some(Severity::Error), true)
    }
}

/// Per-record keep probability
///
/// Rates are clamped to `[0, 1]` when the policy is built, so evaluating a
/// policy never has to re-validate them.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingPolicy {
    default_rate: f64,
    severity_rates: BTreeMap<Severity, f64>,
    category_rates: BTreeMap<String, f64>,
    always_keep: BTreeSet<Severity>,
}

fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) }
}

impl SamplingPolicy {
    /// Policy with the given default rate that always keeps error and fatal
    pub fn new(default_rate: f64) -> Self {
        Self {
            default_rate: clamp_rate(default_rate),
            severity_rates: BTreeMap::new(),
            category_rates: BTreeMap::new(),
            always_keep: BTreeSet::from([Severity::Error, Severity::Fatal]),
        }
    }

    pub fn with_severity_rate(mut self, severity: Severity, rate: f64) -> Self {
        self.severity_rates.insert(severity, clamp_rate(rate));
        self
    }

    pub fn with_category_rate(mut self, category: impl Into<String>, rate: f64) -> Self {
        self.category_rates.insert(category.into(), clamp_rate(rate));
        self
    }

    /// Replace the always-keep set
    pub fn with_always_keep(mut self, severities: impl IntoIterator<Item = Severity>) -> Self {
        self.always_keep = severities.into_iter().collect();
        self
    }

    /// Keep everything
    pub fn debug() -> Self {
        Self::new(1.0).with_always_keep(Severity::ALL)
    }

    /// 10% by default with lower rates for chatty severities
    pub fn production() -> Self {
        Self::new(0.1)
            .with_severity_rate(Severity::Trace, 0.01)
            .with_severity_rate(Severity::Debug, 0.05)
            .with_severity_rate(Severity::Info, 0.1)
            .with_severity_rate(Severity::Warning, 0.5)
    }

    /// 1% of everything below error
    pub fn minimal() -> Self {
        Self::new(0.01)
    }

    pub fn default_rate(&self) -> f64 {
        self.default_rate
    }

    pub fn always_keep(&self) -> &BTreeSet<Severity> {
        &self.always_keep
    }

    /// Resolve the keep rate for a record
    ///
    /// Always-keep severities win, then a per-severity rate, then a
    /// per-category rate, then the default.
    pub fn rate_for(&self, record: &LogRecord) -> f64 {
        if self.always_keep.contains(&record.severity()) {
            return 1.0;
        }
        if let Some(rate) = self.severity_rates.get(&record.severity()) {
            return *rate;
        }
        if let Some(rate) = self.category_rates.get(record.category()) {
            return *rate;
        }
        self.default_rate
    }
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self::new(1.0)
    }
}
