//! Reference [`Sink`] implementations

use std::collections::VecDeque;
use std::io::Write;

use async_trait::async_trait;
use logvault_core::{Formatter, LogRecord, Severity, Sink, SinkError, SinkState};
use parking_lot::Mutex;

use crate::formatter::PrettyFormatter;

/// Which standard stream a [`ConsoleSink`] writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleStream {
    Stdout,
    Stderr,
    /// Error and fatal to stderr, everything else to stdout
    #[default]
    Auto,
}

impl ConsoleStream {
    fn is_stderr(self, severity: Severity) -> bool {
        match self {
            ConsoleStream::Stdout => false,
            ConsoleStream::Stderr => true,
            ConsoleStream::Auto => severity >= Severity::Error,
        }
    }
}

/// Writes formatted records to stdout/stderr
pub struct ConsoleSink {
    identifier: String,
    state: SinkState,
    stream: ConsoleStream,
    formatter: Box<dyn Formatter>,
}

impl ConsoleSink {
    pub const IDENTIFIER: &'static str = "console";

    pub fn new(min_severity: Severity) -> Self {
        Self {
            identifier: Self::IDENTIFIER.to_string(),
            state: SinkState::new(min_severity),
            stream: ConsoleStream::default(),
            formatter: Box::new(PrettyFormatter::standard()),
        }
    }

    pub fn with_formatter(mut self, formatter: impl Formatter + 'static) -> Self {
        self.formatter = Box::new(formatter);
        self
    }

    pub fn with_stream(mut self, stream: ConsoleStream) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    fn write_lines(&self, records: &[LogRecord]) -> Result<(), SinkError> {
        let (mut out, mut err) = (Vec::new(), Vec::new());
        for record in records {
            let target = if self.stream.is_stderr(record.severity()) {
                &mut err
            } else {
                &mut out
            };
            writeln!(target, "{}", self.formatter.format(record))?;
        }
        if !out.is_empty() {
            std::io::stdout().lock().write_all(&out)?;
        }
        if !err.is_empty() {
            std::io::stderr().lock().write_all(&err)?;
        }
        Ok(())
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new(Severity::Trace)
    }
}

#[async_trait]
impl Sink for ConsoleSink {
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
        self.write_lines(std::slice::from_ref(record))
    }

    async fn flush(&self, records: &[LogRecord]) -> Result<(), SinkError> {
        self.write_lines(records)
    }
}

/// Keeps delivered records in memory, oldest evicted first when bounded
pub struct MemorySink {
    identifier: String,
    state: SinkState,
    capacity: Option<usize>,
    records: Mutex<VecDeque<LogRecord>>,
}

impl MemorySink {
    pub const IDENTIFIER: &'static str = "memory";

    pub fn new() -> Self {
        Self {
            identifier: Self::IDENTIFIER.to_string(),
            state: SinkState::default(),
            capacity: None,
            records: Mutex::new(VecDeque::new()),
        }
    }

    /// Retain at most `capacity` records
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::new()
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    pub fn with_min_severity(self, severity: Severity) -> Self {
        self.state.set_min_severity(severity);
        self
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().iter().cloned().collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .map(|r| r.message().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sink for MemorySink {
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
        let mut records = self.records.lock();
        records.push_back(record.clone());
        if let Some(capacity) = self.capacity {
            while records.len() > capacity {
                records.pop_front();
            }
        }
        Ok(())
    }
}
