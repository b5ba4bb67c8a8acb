//! Open spans awaiting their end

use std::collections::HashMap;

use logvault_core::{Metadata, Span};
use parking_lot::Mutex;
use uuid::Uuid;

/// Tracks spans between `start` and `finish`
///
/// Every span it opens is tagged with the tracer's category.
#[derive(Debug)]
pub struct SpanTracer {
    category: String,
    active: Mutex<HashMap<Uuid, Span>>,
}

impl SpanTracer {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Open a span and return its id
    pub fn start(&self, name: impl Into<String>, parent_id: Option<Uuid>) -> Uuid {
        let mut span = Span::new(name, self.category.as_str());
        if let Some(parent) = parent_id {
            span = span.with_parent(parent);
        }
        let id = span.id();
        self.active.lock().insert(id, span);
        id
    }

    /// Close the span with `id`, merging `metadata` into it
    ///
    /// Returns `None` for ids that are unknown or already finished.
    pub fn finish(&self, id: Uuid, metadata: Metadata) -> Option<Span> {
        let span = self.active.lock().remove(&id)?;
        Some(span.ended(metadata))
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Drop every open span without reporting it
    pub fn cancel_all(&self) -> usize {
        let mut active = self.active.lock();
        let count = active.len();
        active.clear();
        count
    }
}
