//! Redaction of sensitive substrings in record messages
//!
//! A [`Sanitizer`] is an ordered list of compiled patterns. Patterns are
//! assembled with [`SanitizerBuilder`], which starts from the built-in set
//! and fails at build time if a custom pattern does not compile.

use std::borrow::Cow;

use logvault_core::LogRecord;
use regex::{NoExpand, Regex};

use crate::error::SanitizerError;

/// A pattern as configured, before compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternSpec {
    pub name: String,
    pub pattern: String,
    pub replacement: String,
    pub enabled: bool,
}

impl PatternSpec {
    pub fn new(
        name: impl Into<String>,
        pattern: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            replacement: replacement.into(),
            enabled: true,
        }
    }
}

// JWT runs before bearer so a bearer JWT is reported as a JWT.
const DEFAULT_PATTERNS: &[(&str, &str, &str)] = &[
    (
        "email",
        r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
        "[EMAIL_REDACTED]",
    ),
    (
        "phone_kr",
        r"01[0-9]-?[0-9]{3,4}-?[0-9]{4}",
        "[PHONE_REDACTED]",
    ),
    (
        "jwt",
        r"eyJ[A-Za-z0-9_-]*\.eyJ[A-Za-z0-9_-]*\.[A-Za-z0-9_-]*",
        "[JWT_REDACTED]",
    ),
    ("bearer", r"Bearer\s+[A-Za-z0-9_-]+", "Bearer [TOKEN_REDACTED]"),
    (
        "api_key",
        r#"(?i)(api[_-]?key|apikey|api_secret|secret[_-]?key)\s*[:=]\s*['"]?[A-Za-z0-9_-]{16,}['"]?"#,
        "[API_KEY_REDACTED]",
    ),
    (
        "credit_card",
        r"\b(?:\d{4}[- ]?){3}\d{4}\b",
        "[CARD_REDACTED]",
    ),
    ("national_id", r"\d{6}[- ]?\d{7}", "[SSN_REDACTED]"),
    (
        "password",
        r#"(?i)(password|passwd|pwd)\s*[:=]\s*['"]?[^\s'",}]+['"]?"#,
        "[PASSWORD_REDACTED]",
    ),
    (
        "ip_address",
        r"\b(?:\d{1,3}\.){3}\d{1,3}\b",
        "[IP_REDACTED]",
    ),
];

/// Assembles a [`Sanitizer`]
#[derive(Debug, Clone)]
pub struct SanitizerBuilder {
    patterns: Vec<PatternSpec>,
    enabled: bool,
}

impl Default for SanitizerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SanitizerBuilder {
    /// Start from the built-in patterns
    pub fn new() -> Self {
        Self {
            patterns: DEFAULT_PATTERNS
                .iter()
                .map(|(name, pattern, replacement)| PatternSpec::new(*name, *pattern, *replacement))
                .collect(),
            enabled: true,
        }
    }

    /// Start with no patterns at all
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            enabled: true,
        }
    }

    /// Append a pattern, replacing any existing one with the same name in place
    pub fn add_pattern(
        self,
        name: impl Into<String>,
        pattern: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        self.add(PatternSpec::new(name, pattern, replacement))
    }

    pub fn add(mut self, spec: PatternSpec) -> Self {
        match self.patterns.iter_mut().find(|p| p.name == spec.name) {
            Some(existing) => *existing = spec,
            None => self.patterns.push(spec),
        }
        self
    }

    pub fn remove(mut self, name: &str) -> Self {
        self.patterns.retain(|p| p.name != name);
        self
    }

    /// Keep the pattern configured but skip it
    pub fn disable(self, name: &str) -> Self {
        self.set_pattern_enabled(name, false)
    }

    pub fn enable(self, name: &str) -> Self {
        self.set_pattern_enabled(name, true)
    }

    /// Turn the whole sanitizer on or off
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn pattern_names(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| p.name.as_str())
    }

    fn set_pattern_enabled(mut self, name: &str, enabled: bool) -> Self {
        if let Some(spec) = self.patterns.iter_mut().find(|p| p.name == name) {
            spec.enabled = enabled;
        }
        self
    }

    /// Compile every enabled pattern
    pub fn build(self) -> Result<Sanitizer, SanitizerError> {
        let mut redactions = Vec::with_capacity(self.patterns.len());
        for spec in self.patterns.into_iter().filter(|p| p.enabled) {
            let regex = Regex::new(&spec.pattern).map_err(|e| SanitizerError::InvalidPattern {
                name: spec.name.clone(),
                reason: e.to_string(),
            })?;
            redactions.push(Redaction {
                name: spec.name,
                regex,
                replacement: spec.replacement,
            });
        }
        Ok(Sanitizer {
            redactions,
            enabled: self.enabled,
        })
    }
}

#[derive(Debug, Clone)]
struct Redaction {
    name: String,
    regex: Regex,
    replacement: String,
}

/// Ordered set of compiled redaction patterns
#[derive(Debug, Clone)]
pub struct Sanitizer {
    redactions: Vec<Redaction>,
    enabled: bool,
}

impl Sanitizer {
    pub fn builder() -> SanitizerBuilder {
        SanitizerBuilder::new()
    }

    /// The built-in pattern set
    pub fn with_defaults() -> Result<Self, SanitizerError> {
        SanitizerBuilder::new().build()
    }

    /// A sanitizer that never changes anything
    pub fn disabled() -> Self {
        Self {
            redactions: Vec::new(),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn pattern_names(&self) -> impl Iterator<Item = &str> {
        self.redactions.iter().map(|r| r.name.as_str())
    }

    /// Apply every pattern in order
    ///
    /// Borrows the input when nothing matched.
    pub fn redact<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut current = Cow::Borrowed(text);
        if !self.enabled {
            return current;
        }
        for redaction in &self.redactions {
            let replaced = match redaction
                .regex
                .replace_all(&current, NoExpand(&redaction.replacement))
            {
                Cow::Owned(text) => Some(text),
                Cow::Borrowed(_) => None,
            };
            if let Some(text) = replaced {
                current = Cow::Owned(text);
            }
        }
        current
    }

    /// Redact the record's message
    ///
    /// The record comes back untouched (same id, same message allocation)
    /// when no pattern matched.
    pub fn sanitize(&self, record: LogRecord) -> LogRecord {
        let redacted = match self.redact(record.message()) {
            Cow::Owned(text) => Some(text),
            Cow::Borrowed(_) => None,
        };
        match redacted {
            Some(text) if text != record.message() => record.with_message(text),
            _ => record,
        }
    }
}
