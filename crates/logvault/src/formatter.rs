//! Reference [`Formatter`] implementations

use logvault_core::{Formatter, LogRecord};

/// Human-readable single line
///
/// `12:30:01.250 [INFO] [Net] connected (client.rs:42) {attempt=3}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrettyFormatter {
    pub include_timestamp: bool,
    pub include_location: bool,
    pub include_metadata: bool,
}

impl Default for PrettyFormatter {
    fn default() -> Self {
        Self::standard()
    }
}

impl PrettyFormatter {
    pub const fn standard() -> Self {
        Self {
            include_timestamp: true,
            include_location: true,
            include_metadata: true,
        }
    }

    /// Level, category and message only
    pub const fn compact() -> Self {
        Self {
            include_timestamp: false,
            include_location: false,
            include_metadata: false,
        }
    }

    /// Everything, including the attached user context
    pub const fn verbose() -> Self {
        Self::standard()
    }
}

impl Formatter for PrettyFormatter {
    fn format(&self, record: &LogRecord) -> String {
        let mut parts = Vec::with_capacity(5);
        if self.include_timestamp {
            parts.push(record.timestamp().format("%H:%M:%S%.3f").to_string());
        }
        parts.push(format!("[{}]", record.severity()));
        parts.push(format!("[{}]", record.category()));
        parts.push(record.message().to_string());
        if self.include_location {
            parts.push(format!("({}:{})", record.file_name(), record.location().line));
        }

        let mut line = parts.join(" ");
        if self.include_metadata {
            if let Some(metadata) = record.metadata().filter(|m| !m.is_empty()) {
                let fields: Vec<String> = metadata.iter().map(|(k, v)| format!("{k}={v}")).collect();
                line.push_str(&format!(" {{{}}}", fields.join(", ")));
            }
        }
        line
    }
}

/// One JSON object per record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonFormatter {
    pub pretty: bool,
}

impl Formatter for JsonFormatter {
    fn format(&self, record: &LogRecord) -> String {
        let encoded = if self.pretty {
            serde_json::to_string_pretty(record)
        } else {
            serde_json::to_string(record)
        };
        encoded.unwrap_or_else(|e| {
            serde_json::json!({
                "id": record.id().to_string(),
                "severity": record.severity(),
                "message": record.message(),
                "encode_error": e.to_string(),
            })
            .to_string()
        })
    }
}
