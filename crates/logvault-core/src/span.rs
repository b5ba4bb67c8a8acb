//! Timed sections of work
//!
//! A [`Span`] is opened with a name and category, optionally nested under a
//! parent, and closed with [`Span::ended`]. Durations come from a monotonic
//! clock; the wall-clock start is kept for reporting.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::value::{Metadata, Value};

/// Category used for spans when none is configured
pub const SPAN_CATEGORY: &str = "Performance";

#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    id: Uuid,
    name: String,
    category: String,
    parent_id: Option<Uuid>,
    started_at: DateTime<Utc>,
    start: Instant,
    end: Option<Instant>,
    metadata: Metadata,
}

impl Span {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            category: category.into(),
            parent_id: None,
            started_at: Utc::now(),
            start: Instant::now(),
            end: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The same span, closed now, with `extra` merged over its metadata
    ///
    /// Ending an already ended span keeps the first end time.
    pub fn ended(mut self, extra: Metadata) -> Self {
        self.end.get_or_insert_with(Instant::now);
        self.metadata.extend(extra);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn parent_id(&self) -> Option<Uuid> {
        self.parent_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn is_finished(&self) -> bool {
        self.end.is_some()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.end.map(|end| end.duration_since(self.start))
    }

    pub fn duration_ms(&self) -> Option<f64> {
        self.duration().map(|d| d.as_secs_f64() * 1_000.0)
    }

    /// Flattened description for attaching to a log record
    ///
    /// Span fields win over user metadata with the same key.
    pub fn to_metadata(&self) -> Metadata {
        let mut map = self.metadata.clone();
        map.insert("span_id".into(), self.id.to_string().into());
        map.insert("name".into(), self.name.clone().into());
        map.insert("category".into(), self.category.clone().into());
        map.insert("started_at".into(), self.started_at.to_rfc3339().into());
        if let Some(parent) = self.parent_id {
            map.insert("parent_id".into(), parent.to_string().into());
        }
        if let Some(ms) = self.duration_ms() {
            map.insert("duration_ms".into(), ms.into());
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_span_has_no_duration() {
        let span = Span::new("load", SPAN_CATEGORY);
        assert!(!span.is_finished());
        assert!(span.duration().is_none());
        assert!(!span.to_metadata().contains_key("duration_ms"));
    }

    #[test]
    fn test_ended_span_measures_elapsed_time() {
        let span = Span::new("load", SPAN_CATEGORY).with_field("rows", 3i64);
        std::thread::sleep(Duration::from_millis(5));

        let mut extra = Metadata::new();
        extra.insert("success".into(), true.into());
        let span = span.ended(extra);

        assert!(span.duration().unwrap() >= Duration::from_millis(5));
        assert_eq!(span.metadata()["rows"], Value::from(3i64));
        assert_eq!(span.metadata()["success"], Value::from(true));
    }

    #[test]
    fn test_ending_twice_keeps_first_end() {
        let span = Span::new("load", SPAN_CATEGORY).ended(Metadata::new());
        let first = span.duration();
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(span.ended(Metadata::new()).duration(), first);
    }

    #[test]
    fn test_metadata_includes_parent_and_duration() {
        let parent = Span::new("request", SPAN_CATEGORY);
        let child = Span::new("query", "Db")
            .with_parent(parent.id())
            .ended(Metadata::new());

        let map = child.to_metadata();
        assert_eq!(map["parent_id"], Value::from(parent.id().to_string()));
        assert_eq!(map["name"], Value::from("query"));
        assert_eq!(map["category"], Value::from("Db"));
        assert!(map.contains_key("duration_ms"));
        assert!(map.contains_key("started_at"));
    }
}
