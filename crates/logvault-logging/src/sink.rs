//! A [`Sink`] that re-emits records as `tracing` events

use async_trait::async_trait;
use logvault_core::{LogRecord, Severity, Sink, SinkError, SinkState};
use tracing::Level;

/// Forwards records into whatever `tracing` subscriber is installed
///
/// Fatal records are emitted at `ERROR` with `fatal = true`.
#[derive(Debug)]
pub struct TracingSink {
    identifier: String,
    state: SinkState,
}

impl TracingSink {
    pub const IDENTIFIER: &'static str = "tracing";

    pub fn new(min_severity: Severity) -> Self {
        Self {
            identifier: Self::IDENTIFIER.to_string(),
            state: SinkState::new(min_severity),
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new(Severity::Trace)
    }
}

macro_rules! emit {
    ($level:expr, $record:expr, $fatal:expr, $metadata:expr) => {
        tracing::event!(
            target: "logvault",
            $level,
            record_id = %$record.id(),
            category = $record.category(),
            file = $record.location().file.as_str(),
            line = $record.location().line,
            fatal = $fatal,
            metadata = $metadata,
            "{}",
            $record.message()
        )
    };
}

#[async_trait]
impl Sink for TracingSink {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn min_severity(&self) -> Severity {
        self.state.min_severity()
    }

    fn set_min_severity(&self, severity: Severity) {
        self.state.set_min_severity(severity);
    }

    fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }

    fn set_enabled(&self, enabled: bool) {
        self.state.set_enabled(enabled);
    }

    async fn log(&self, record: &LogRecord) -> Result<(), SinkError> {
        let metadata = match record.metadata() {
            Some(metadata) => serde_json::to_string(metadata)
                .map_err(|e| SinkError::other(format!("metadata encoding: {e}")))?,
            None => String::new(),
        };
        let metadata = metadata.as_str();
        let fatal = record.severity() == Severity::Fatal;

        // Levels must be constant at each callsite
        match record.severity() {
            Severity::Trace => emit!(Level::TRACE, record, fatal, metadata),
            Severity::Debug => emit!(Level::DEBUG, record, fatal, metadata),
            Severity::Info => emit!(Level::INFO, record, fatal, metadata),
            Severity::Warning => emit!(Level::WARN, record, fatal, metadata),
            Severity::Error | Severity::Fatal => emit!(Level::ERROR, record, fatal, metadata),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier() {
        assert_eq!(TracingSink::default().identifier(), "tracing");
        assert_eq!(
            TracingSink::default().with_identifier("diag").identifier(),
            "diag"
        );
    }
}
