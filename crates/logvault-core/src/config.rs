//! Pipeline configuration
//!
//! [`LoggerConfig`] is owned by the host application. Configurations from
//! different layers (compiled defaults, environment, runtime overrides) are
//! combined with [`LoggerConfig::merged`].

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::severity::Severity;

/// Configuration consumed by the dispatch facade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Records below this severity are dropped on entry
    pub min_severity: Severity,
    /// Only these categories are accepted (`None` accepts all)
    pub allowed_categories: Option<BTreeSet<String>>,
    /// Sinks that are skipped during fan-out
    pub disabled_sinks: BTreeSet<String>,
    /// Run the sanitizer on accepted records
    pub sanitize: bool,
    /// Keep rate used when no explicit sampling policy is supplied
    pub sample_rate: f64,
    /// Buffer size used when no explicit buffer policy is supplied
    pub buffer_size: usize,
    #[serde(with = "duration_secs")]
    pub flush_interval: Duration,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_severity: Severity::Trace,
            allowed_categories: None,
            disabled_sinks: BTreeSet::new(),
            sanitize: true,
            sample_rate: 1.0,
            buffer_size: 100,
            flush_interval: Duration::from_secs(5),
        }
    }
}

impl LoggerConfig {
    /// Everything on, nothing redacted
    pub fn debug() -> Self {
        Self {
            sanitize: false,
            ..Default::default()
        }
    }

    /// Info and above, redacted, 10% sampled
    pub fn production() -> Self {
        Self {
            min_severity: Severity::Info,
            sample_rate: 0.1,
            ..Default::default()
        }
    }

    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = severity;
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_categories = Some(categories.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_disabled_sink(mut self, identifier: impl Into<String>) -> Self {
        self.disabled_sinks.insert(identifier.into());
        self
    }

    pub fn with_sanitize(mut self, enabled: bool) -> Self {
        self.sanitize = enabled;
        self
    }

    pub fn with_sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Whether a record with this severity and category passes the entry gate
    pub fn accepts(&self, severity: Severity, category: &str) -> bool {
        if severity < self.min_severity {
            return false;
        }
        match &self.allowed_categories {
            Some(allowed) => allowed.contains(category),
            None => true,
        }
    }

    pub fn is_sink_disabled(&self, identifier: &str) -> bool {
        self.disabled_sinks.contains(identifier)
    }

    /// Layer `other` on top of `self`
    ///
    /// `other` wins for every field except `disabled_sinks`, which are
    /// unioned, and `allowed_categories`, which falls back to `self` when
    /// `other` does not restrict categories.
    pub fn merged(&self, other: &LoggerConfig) -> LoggerConfig {
        LoggerConfig {
            min_severity: other.min_severity,
            allowed_categories: other
                .allowed_categories
                .clone()
                .or_else(|| self.allowed_categories.clone()),
            disabled_sinks: self
                .disabled_sinks
                .union(&other.disabled_sinks)
                .cloned()
                .collect(),
            sanitize: other.sanitize,
            sample_rate: other.sample_rate,
            buffer_size: other.buffer_size,
            flush_interval: other.flush_interval,
        }
    }

    /// Defaults overlaid with `LOGVAULT_*` environment variables
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self::default().with_overrides_from(lookup)
    }

    /// Overlay `LOGVAULT_*` environment variables on this configuration
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Overlay the variables `lookup` knows about; unset keys keep their value
    pub fn with_overrides_from(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = self;

        if let Some(severity) = lookup("LOGVAULT_MIN_SEVERITY").and_then(|v| v.parse().ok()) {
            config.min_severity = severity;
        }
        if let Some(categories) = lookup("LOGVAULT_CATEGORIES") {
            config.allowed_categories = Some(split_list(&categories));
        }
        if let Some(sinks) = lookup("LOGVAULT_DISABLED_SINKS") {
            config.disabled_sinks = split_list(&sinks);
        }
        if let Some(sanitize) = lookup("LOGVAULT_SANITIZE").and_then(|v| parse_bool(&v)) {
            config.sanitize = sanitize;
        }
        if let Some(rate) = lookup("LOGVAULT_SAMPLE_RATE").and_then(|v| v.trim().parse().ok()) {
            config = config.with_sample_rate(rate);
        }
        if let Some(size) = lookup("LOGVAULT_BUFFER_SIZE").and_then(|v| v.trim().parse().ok()) {
            config = config.with_buffer_size(size);
        }
        if let Some(secs) = lookup("LOGVAULT_FLUSH_INTERVAL_SECS")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|s| s.is_finite() && *s >= 0.0)
        {
            config.flush_interval = Duration::from_secs_f64(secs);
        }

        config
    }
}

fn split_list(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Serialize a [`Duration`] as fractional seconds
pub mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(D::Error::custom(format!("invalid duration: {secs}")));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}
