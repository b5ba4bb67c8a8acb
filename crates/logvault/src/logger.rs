//! Dispatch facade
//!
//! [`Logger`] runs every incoming record through the pipeline:
//!
//! 1. severity / category gate from [`LoggerConfig`]
//! 2. sampling
//! 3. ambient user context
//! 4. redaction (when enabled in the configuration)
//! 5. crash-preserver ring
//! 6. buffer, or immediate fan-out when unbuffered
//!
//! Fan-out visits sinks in registration order, skips sinks disabled by the
//! configuration, and keeps going when one sink fails.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use logvault_core::{ContextProvider, LogRecord, LoggerConfig, Metadata, Severity, Sink, Span};
use logvault_crash::{CrashPreserver, PreserveError, Recovery};
use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::buffer::{Buffer, FlushHandler};
use crate::sampler::Sampler;
use crate::sanitizer::Sanitizer;
use crate::tracer::SpanTracer;

/// Sinks plus the configuration that governs fan-out
///
/// Shared between the logger and the buffer's flush handler.
pub(crate) struct Dispatcher {
    config: RwLock<LoggerConfig>,
    sinks: RwLock<Vec<Arc<dyn Sink>>>,
}

impl Dispatcher {
    pub(crate) fn new(config: LoggerConfig, sinks: Vec<Arc<dyn Sink>>) -> Self {
        Self {
            config: RwLock::new(config),
            sinks: RwLock::new(sinks),
        }
    }

    async fn dispatch(&self, records: Vec<LogRecord>) {
        if records.is_empty() {
            return;
        }

        let sinks = self.sinks.read().clone();
        let disabled = self.config.read().disabled_sinks.clone();

        for sink in sinks {
            if disabled.contains(sink.identifier()) || !sink.is_enabled() {
                continue;
            }
            let accepted: Vec<LogRecord> = records
                .iter()
                .filter(|r| sink.accepts(r))
                .cloned()
                .collect();
            if accepted.is_empty() {
                continue;
            }
            if let Err(e) = sink.flush(&accepted).await {
                warn!(
                    sink = sink.identifier(),
                    records = accepted.len(),
                    error = %e,
                    "Sink delivery failed"
                );
            }
        }
    }
}

#[async_trait]
impl FlushHandler for Dispatcher {
    async fn on_flush(&self, records: Vec<LogRecord>) {
        self.dispatch(records).await;
    }
}

pub(crate) struct Components {
    pub dispatcher: Arc<Dispatcher>,
    pub buffer: Option<Arc<Buffer>>,
    /// Buffer size and interval follow the configuration
    pub buffer_from_config: bool,
    pub sampler: Option<Sampler>,
    /// Sampler was derived from `sample_rate` rather than supplied
    pub sampler_from_config: bool,
    pub sanitizer: Option<Sanitizer>,
    pub context_provider: Option<Arc<dyn ContextProvider>>,
    pub preserver: Option<Arc<CrashPreserver>>,
    pub tracer: SpanTracer,
}

struct Inner {
    dispatcher: Arc<Dispatcher>,
    buffer: Option<Arc<Buffer>>,
    buffer_from_config: bool,
    sampler: RwLock<Option<Sampler>>,
    sampler_from_config: bool,
    sanitizer: Option<Sanitizer>,
    context_provider: Option<Arc<dyn ContextProvider>>,
    preserver: Option<Arc<CrashPreserver>>,
    tracer: SpanTracer,
}

/// Handle to a logging pipeline; cheap to clone
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Inner>,
}

impl Logger {
    pub(crate) fn from_components(components: Components) -> Self {
        if let Some(buffer) = &components.buffer {
            let handler: Arc<dyn FlushHandler> = components.dispatcher.clone();
            buffer.start_auto_flush(handler);
        }

        Self {
            inner: Arc::new(Inner {
                dispatcher: components.dispatcher,
                buffer: components.buffer,
                buffer_from_config: components.buffer_from_config,
                sampler: RwLock::new(components.sampler),
                sampler_from_config: components.sampler_from_config,
                sanitizer: components.sanitizer,
                context_provider: components.context_provider,
                preserver: components.preserver,
                tracer: components.tracer,
            }),
        }
    }

    /// Start assembling a logger
    pub fn builder() -> crate::LoggerBuilder {
        crate::LoggerBuilder::new()
    }

    pub fn config(&self) -> LoggerConfig {
        self.inner.dispatcher.config.read().clone()
    }

    /// Run a record through the pipeline
    pub async fn log(&self, record: LogRecord) {
        let sanitize = {
            let config = self.inner.dispatcher.config.read();
            if !config.accepts(record.severity(), record.category()) {
                return;
            }
            config.sanitize
        };

        if let Some(sampler) = self.inner.sampler.read().as_ref() {
            if !sampler.should_keep(&record) {
                return;
            }
        }

        let mut record = record;
        if let Some(provider) = &self.inner.context_provider {
            record = record.with_user_context(provider.current_context().await);
        }

        if sanitize {
            if let Some(sanitizer) = &self.inner.sanitizer {
                record = sanitizer.sanitize(record);
            }
        }

        if let Some(preserver) = &self.inner.preserver {
            preserver.record(record.clone());
        }

        match &self.inner.buffer {
            Some(buffer) => {
                buffer.append(record).await;
            }
            None => self.inner.dispatcher.dispatch(vec![record]).await,
        }
    }

    /// Register a sink after construction; delivery order is registration order
    pub fn add_sink(&self, sink: Arc<dyn Sink>) {
        debug!(sink = sink.identifier(), "Sink added");
        self.inner.dispatcher.sinks.write().push(sink);
    }

    /// Remove every sink with this identifier; returns how many were removed
    pub fn remove_sink(&self, identifier: &str) -> usize {
        let mut sinks = self.inner.dispatcher.sinks.write();
        let before = sinks.len();
        sinks.retain(|s| s.identifier() != identifier);
        before - sinks.len()
    }

    pub fn sink_identifiers(&self) -> Vec<String> {
        self.inner
            .dispatcher
            .sinks
            .read()
            .iter()
            .map(|s| s.identifier().to_string())
            .collect()
    }

    /// Replace the configuration
    ///
    /// A config-derived buffer picks up the new size immediately and its
    /// timer is re-armed only when the interval changed. A config-derived
    /// sampler follows the new sample rate.
    pub async fn configure(&self, config: LoggerConfig) {
        let previous = std::mem::replace(&mut *self.inner.dispatcher.config.write(), config.clone());

        if self.inner.sampler_from_config && previous.sample_rate != config.sample_rate {
            *self.inner.sampler.write() = crate::builder::sampler_for_rate(config.sample_rate);
        }

        if let (Some(buffer), true) = (&self.inner.buffer, self.inner.buffer_from_config) {
            let mut policy = buffer.policy();
            policy.max_size = config.buffer_size.max(1);
            let interval_changed = policy.flush_interval != config.flush_interval;
            policy.flush_interval = config.flush_interval;
            buffer.set_policy(policy);

            if interval_changed {
                buffer.stop_auto_flush().await;
                let handler: Arc<dyn FlushHandler> = self.inner.dispatcher.clone();
                buffer.start_auto_flush(handler);
                debug!(interval = ?config.flush_interval, "Auto-flush re-armed");
            }
        }
    }

    /// Deliver everything the buffer holds
    pub async fn flush(&self) {
        if let Some(buffer) = &self.inner.buffer {
            buffer.flush_to_handler().await;
        }
    }

    /// Host application moved to the background
    pub async fn enter_background(&self) {
        if let Some(buffer) = &self.inner.buffer {
            if buffer.policy().flush_on_background {
                buffer.flush_to_handler().await;
            }
        }
        if let Some(preserver) = &self.inner.preserver {
            if let Err(e) = preserver.persist().await {
                warn!(error = %e, "Failed to persist crash logs");
            }
        }
    }

    pub fn crash_preserver(&self) -> Option<&Arc<CrashPreserver>> {
        self.inner.preserver.as_ref()
    }

    /// Records (and crash report) left by the previous run
    ///
    /// Errors are logged and reported as nothing to recover.
    pub async fn recover_crash_logs(&self) -> Option<Recovery> {
        let preserver = self.inner.preserver.as_ref()?;
        match preserver.recover().await {
            Ok(recovery) => recovery,
            Err(e) => {
                warn!(error = %e, "Crash log recovery failed");
                None
            }
        }
    }

    pub async fn clear_crash_logs(&self) {
        if let Some(preserver) = &self.inner.preserver {
            if let Err(e) = preserver.clear().await {
                warn!(error = %e, "Failed to clear crash logs");
            }
        }
    }

    /// Write the preserver ring to disk, propagating errors
    pub async fn persist_crash_logs(&self) -> Result<(), PreserveError> {
        match &self.inner.preserver {
            Some(preserver) => preserver.persist().await,
            None => Ok(()),
        }
    }

    /// Open a timed span, optionally nested under `parent_id`
    pub fn start_span(&self, name: impl Into<String>, parent_id: Option<Uuid>) -> Uuid {
        self.inner.tracer.start(name, parent_id)
    }

    /// Close a span and log it at debug severity
    ///
    /// The record carries the span's id, name, category, start time, parent
    /// and `duration_ms` as metadata, plus `metadata`. Unknown or already
    /// ended ids return `None` and log nothing.
    pub async fn end_span(&self, id: Uuid, metadata: Metadata) -> Option<Span> {
        let Some(span) = self.inner.tracer.finish(id, metadata) else {
            debug!(span_id = %id, "End of unknown span ignored");
            return None;
        };
        let ms = span.duration_ms().unwrap_or_default();
        let record = LogRecord::new(
            Severity::Debug,
            format!("[{}] completed in {ms:.2}ms", span.name()),
            span.category(),
            logvault_core::call_site!(),
        )
        .with_metadata(span.to_metadata());
        self.log(record).await;
        Some(span)
    }

    /// Run `op` inside a span named `name`
    ///
    /// The span ends with `success` set, and with `error` holding the
    /// message when `op` fails. The result is passed through untouched.
    pub async fn measure<T, E, F, Fut>(&self, name: impl Into<String>, op: F) -> Result<T, E>
    where
        E: Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let id = self.start_span(name, None);
        let result = op().await;

        let mut outcome = Metadata::new();
        outcome.insert("success".into(), result.is_ok().into());
        if let Err(e) = &result {
            outcome.insert("error".into(), e.to_string().into());
        }
        self.end_span(id, outcome).await;
        result
    }

    pub fn active_span_count(&self) -> usize {
        self.inner.tracer.active_count()
    }

    /// Stop the timer, deliver what is pending, persist the ring
    #[instrument(skip_all)]
    pub async fn shutdown(&self) {
        if let Some(buffer) = &self.inner.buffer {
            buffer.stop_auto_flush().await;
            buffer.flush_to_handler().await;
        }
        if let Err(e) = self.persist_crash_logs().await {
            warn!(error = %e, "Failed to persist crash logs on shutdown");
        }
        info!("Logger shut down");
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("sinks", &self.sink_identifiers())
            .field("buffered", &self.inner.buffer.is_some())
            .field("sanitizer", &self.inner.sanitizer.is_some())
            .field("preserver", &self.inner.preserver.is_some())
            .finish()
    }
}
