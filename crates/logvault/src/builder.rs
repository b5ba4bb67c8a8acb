//! Assembly of a [`Logger`]

use std::sync::Arc;

use logvault_core::{
    BufferPolicy, ContextProvider, LoggerConfig, SPAN_CATEGORY, SamplingPolicy, Severity, Sink,
    StaticContextProvider, UserContext,
};
use logvault_crash::{CrashPreserver, PreserverConfig};
use tracing::{debug, warn};

use crate::buffer::Buffer;
use crate::error::BuildError;
use crate::formatter::PrettyFormatter;
use crate::logger::{Components, Dispatcher, Logger};
use crate::sampler::Sampler;
use crate::sanitizer::SanitizerBuilder;
use crate::sinks::ConsoleSink;
use crate::tracer::SpanTracer;

/// Where the buffer policy comes from
#[derive(Debug, Clone)]
enum BufferChoice {
    Unbuffered,
    Explicit(BufferPolicy),
    /// Size and interval from [`LoggerConfig`], other fields from the default policy
    FromConfig,
}

/// Builder for [`Logger`]
///
/// Nothing is buffered, sampled, redacted or preserved unless asked for.
pub struct LoggerBuilder {
    config: LoggerConfig,
    env_overrides: bool,
    sinks: Vec<Arc<dyn Sink>>,
    buffer: BufferChoice,
    sampling: Option<SamplingPolicy>,
    sanitizer: Option<SanitizerBuilder>,
    context_provider: Option<Arc<dyn ContextProvider>>,
    preserver: Option<PreserverConfig>,
    crash_handler: bool,
    span_category: String,
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggerBuilder {
    pub fn new() -> Self {
        Self {
            config: LoggerConfig::default(),
            env_overrides: false,
            sinks: Vec::new(),
            buffer: BufferChoice::Unbuffered,
            sampling: None,
            sanitizer: None,
            context_provider: None,
            preserver: None,
            crash_handler: false,
            span_category: SPAN_CATEGORY.to_string(),
        }
    }

    /// Console output of everything, redaction on, configuration from the
    /// environment
    pub fn debug() -> Self {
        Self::new()
            .add_sink(ConsoleSink::new(Severity::Trace).with_formatter(PrettyFormatter::verbose()))
            .with_config(LoggerConfig::debug())
            .with_default_sanitizer()
            .with_env_overrides()
    }

    /// Buffered, sampled and redacted, with the crash preserver in `crash_dir`
    pub fn production(crash_dir: impl AsRef<std::path::Path>) -> Self {
        Self::new()
            .add_sink(ConsoleSink::new(Severity::Warning))
            .with_config(LoggerConfig::production())
            .with_buffer(BufferPolicy::default())
            .with_sampling(SamplingPolicy::production())
            .with_default_sanitizer()
            .with_crash_preservation(PreserverConfig::in_dir(crash_dir))
            .with_env_overrides()
    }

    pub fn with_config(mut self, config: LoggerConfig) -> Self {
        self.config = config;
        self
    }

    /// Overlay `LOGVAULT_*` variables on the configuration at build time
    pub fn with_env_overrides(mut self) -> Self {
        self.env_overrides = true;
        self
    }

    pub fn add_sink(self, sink: impl Sink + 'static) -> Self {
        self.add_shared_sink(Arc::new(sink))
    }

    /// Register a sink the caller keeps a handle to
    pub fn add_shared_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_buffer(mut self, policy: BufferPolicy) -> Self {
        self.buffer = BufferChoice::Explicit(policy);
        self
    }

    /// Buffer sized by `buffer_size` / `flush_interval` of the configuration
    pub fn with_config_buffer(mut self) -> Self {
        self.buffer = BufferChoice::FromConfig;
        self
    }

    pub fn with_sampling(mut self, policy: SamplingPolicy) -> Self {
        self.sampling = Some(policy);
        self
    }

    pub fn with_sanitizer(mut self, sanitizer: SanitizerBuilder) -> Self {
        self.sanitizer = Some(sanitizer);
        self
    }

    pub fn with_default_sanitizer(self) -> Self {
        self.with_sanitizer(SanitizerBuilder::new())
    }

    pub fn with_context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.context_provider = Some(provider);
        self
    }

    /// Attach a fixed context for this device
    pub fn with_static_context(self, context: UserContext) -> Self {
        self.with_context_provider(Arc::new(StaticContextProvider::new(context)))
    }

    pub fn with_crash_preservation(mut self, config: PreserverConfig) -> Self {
        self.preserver = Some(config);
        self
    }

    /// Category stamped on span records
    pub fn with_span_category(mut self, category: impl Into<String>) -> Self {
        self.span_category = category.into();
        self
    }

    /// Route fatal signals to the crash preserver (unix only)
    pub fn with_crash_handler(mut self) -> Self {
        self.crash_handler = true;
        self
    }

    /// Assemble the logger
    ///
    /// Starts the auto-flush timer when a buffer with a non-zero interval is
    /// configured, so this must run inside a Tokio runtime.
    pub async fn build(self) -> Result<Logger, BuildError> {
        let config = if self.env_overrides {
            self.config.with_env_overrides()
        } else {
            self.config
        };

        let sanitizer = self.sanitizer.map(SanitizerBuilder::build).transpose()?;

        let preserver = match self.preserver {
            Some(preserver_config) => Some(Arc::new(CrashPreserver::new(preserver_config)?)),
            None => None,
        };
        if self.crash_handler {
            install_signal_handler(preserver.as_ref());
        }

        let (sampler, sampler_from_config) = match self.sampling {
            Some(policy) => (Some(Sampler::new(policy)), false),
            None => (sampler_for_rate(config.sample_rate), true),
        };

        let (buffer, buffer_from_config) = match self.buffer {
            BufferChoice::Unbuffered => (None, false),
            BufferChoice::Explicit(policy) => (Some(Arc::new(Buffer::new(policy))), false),
            BufferChoice::FromConfig => {
                let defaults = BufferPolicy::default();
                let policy = BufferPolicy::new(
                    config.buffer_size,
                    config.flush_interval,
                    defaults.flush_on,
                    defaults.flush_on_background,
                );
                (Some(Arc::new(Buffer::new(policy))), true)
            }
        };

        debug!(
            sinks = self.sinks.len(),
            buffered = buffer.is_some(),
            sampled = sampler.is_some(),
            sanitized = sanitizer.is_some(),
            preserved = preserver.is_some(),
            "Logger built"
        );

        Ok(Logger::from_components(Components {
            dispatcher: Arc::new(Dispatcher::new(config, self.sinks)),
            buffer,
            buffer_from_config,
            sampler,
            sampler_from_config,
            sanitizer,
            context_provider: self.context_provider,
            preserver,
            tracer: SpanTracer::new(self.span_category),
        }))
    }
}

/// A sampler for a plain keep rate; none when everything is kept
pub(crate) fn sampler_for_rate(rate: f64) -> Option<Sampler> {
    (rate < 1.0).then(|| Sampler::new(SamplingPolicy::new(rate)))
}

#[cfg(unix)]
fn install_signal_handler(preserver: Option<&Arc<CrashPreserver>>) {
    let Some(preserver) = preserver else {
        warn!("Crash handler requested without crash preservation");
        return;
    };
    if let Err(e) = logvault_crash::install_crash_handler(Arc::clone(preserver)) {
        warn!(error = %e, "Crash handler not installed");
    }
}

#[cfg(not(unix))]
fn install_signal_handler(_preserver: Option<&Arc<CrashPreserver>>) {
    warn!("Crash handler is only available on unix");
}
