//! The immutable log record value
//!
//! A [`LogRecord`] is created once per log call and never mutated. The
//! transformations the pipeline applies (sanitizing the message, attaching
//! user context) produce a new record that keeps the original `id`, so the
//! id is the stable identity of a record across the whole pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::UserContext;
use crate::severity::Severity;
use crate::value::{Metadata, Value};

/// Category used when the caller does not name one
pub const DEFAULT_CATEGORY: &str = "Default";

/// Source location of a log call
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CallSite {
    pub file: String,
    pub function: String,
    pub line: u32,
}

impl CallSite {
    pub fn new(file: impl Into<String>, function: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            function: function.into(),
            line,
        }
    }

    /// Recover an enclosing function path from the type name of a marker
    /// function declared inside it (see the `call_site!` macro)
    #[doc(hidden)]
    pub fn function_from_type_name(name: &'static str) -> &'static str {
        let mut name = name.strip_suffix("::__here").unwrap_or(name);
        while let Some(stripped) = name.strip_suffix("::{{closure}}") {
            name = stripped;
        }
        name
    }
}

/// Capture the current file, enclosing function and line as a [`CallSite`]
#[macro_export]
macro_rules! call_site {
    () => {{
        fn __here() {}
        fn __type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        $crate::CallSite::new(
            file!(),
            $crate::CallSite::function_from_type_name(__type_name_of(__here)),
            line!(),
        )
    }};
}

/// A single structured log event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    id: Uuid,
    severity: Severity,
    message: String,
    category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_context: Option<UserContext>,
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    location: CallSite,
}

impl LogRecord {
    /// Create a record stamped with a fresh id and the current time
    pub fn new(
        severity: Severity,
        message: impl Into<String>,
        category: impl Into<String>,
        location: CallSite,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            severity,
            message: message.into(),
            category: category.into(),
            metadata: None,
            user_context: None,
            timestamp: Utc::now(),
            location,
        }
    }

    /// Replace the id (used when replaying records from another source)
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = if metadata.is_empty() {
            None
        } else {
            Some(metadata)
        };
        self
    }

    /// Add a single metadata entry
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(Metadata::new)
            .insert(key.into(), value.into());
        self
    }

    /// Same record with a replacement message
    pub fn with_message(self, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..self
        }
    }

    /// Same record with the given user context attached
    pub fn with_user_context(self, context: UserContext) -> Self {
        Self {
            user_context: Some(context),
            ..self
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    pub fn user_context(&self) -> Option<&UserContext> {
        self.user_context.as_ref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn location(&self) -> &CallSite {
        &self.location
    }

    /// Last path component of the call-site file
    pub fn file_name(&self) -> &str {
        self.location
            .file
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.location.file)
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] [{}] {} ({}:{})",
            self.severity,
            self.category,
            self.message,
            self.file_name(),
            self.location.line
        )
    }
}
