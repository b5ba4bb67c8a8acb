//! Diagnostics output for logvault
//!
//! Installs a `tracing` subscriber (JSONL or pretty console, optional
//! rotating JSONL files) and provides [`TracingSink`], which feeds logvault
//! records into that subscriber.
//!
//! ```ignore
//! use logvault_logging::{LogConfig, SubscriberBuilder, TracingSink};
//!
//! let _guard = SubscriberBuilder::new()
//!     .with_config(LogConfig::production("./data/logs"))
//!     .init()?;
//!
//! let logger = logvault::LoggerBuilder::new()
//!     .add_sink(TracingSink::default())
//!     .build()
//!     .await?;
//! ```

pub mod config;
pub mod error;
pub mod sink;

pub use config::{ConsoleConfig, FileConfig, JsonlConfig, LogConfig, RotationStrategy};
pub use error::LoggingError;
pub use sink::TracingSink;
pub use tracing_appender::non_blocking::WorkerGuard;

use std::fs::{self, File};

use tracing::Subscriber;
use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt};

/// Builds and installs the diagnostics subscriber
///
/// Console output is JSONL unless `console.pretty` is set. `RUST_LOG`
/// overrides `default_level` unless [`ignore_env`](Self::ignore_env) is used.
#[derive(Debug, Clone)]
pub struct SubscriberBuilder {
    config: LogConfig,
    use_env: bool,
}

impl SubscriberBuilder {
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
            use_env: true,
        }
    }

    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Use `default_level` even when `RUST_LOG` is set
    pub fn ignore_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        if self.use_env {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return Ok(filter);
            }
        }
        EnvFilter::try_new(&self.config.default_level).map_err(|e| LoggingError::Filter {
            directive: self.config.default_level.clone(),
            reason: e.to_string(),
        })
    }

    /// Build the subscriber without installing it
    ///
    /// The guard, when present, must outlive the subscriber or buffered
    /// file output is lost.
    pub fn build(
        &self,
    ) -> Result<(impl Subscriber + Send + Sync + use<>, Option<WorkerGuard>), LoggingError> {
        let filter = self.env_filter()?;
        let console = &self.config.console;
        let jsonl = &self.config.jsonl;

        let pretty_console = (console.enabled && console.pretty).then(|| {
            tracing_subscriber::fmt::layer()
                .with_ansi(console.ansi)
                .with_target(true)
        });
        let json_console = (console.enabled && !console.pretty)
            .then(|| jsonl_layer(jsonl, std::io::stdout));

        let (file_layer, guard) = match &self.config.file {
            Some(file) => {
                let (writer, guard) = file_writer(file)?;
                (Some(jsonl_layer(jsonl, writer)), Some(guard))
            }
            None => (None, None),
        };

        let subscriber = Registry::default()
            .with(filter)
            .with(pretty_console)
            .with(json_console)
            .with(file_layer);
        Ok((subscriber, guard))
    }

    /// Install the subscriber as the global default
    pub fn init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let (subscriber, guard) = self.build()?;
        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| LoggingError::AlreadyInstalled(e.to_string()))?;
        Ok(guard)
    }

    /// Like [`init`](Self::init) but tolerates an already installed subscriber
    pub fn try_init(self) -> Option<WorkerGuard> {
        self.init().ok().flatten()
    }
}

impl Default for SubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn jsonl_layer<S, W>(jsonl: &JsonlConfig, writer: W) -> impl Layer<S> + Send + Sync + use<S, W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(jsonl.include_spans)
        .flatten_event(jsonl.flatten_events)
        .with_file(jsonl.include_location)
        .with_line_number(jsonl.include_location)
        .with_writer(writer)
}

fn file_writer(file: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let rotation = match file.rotation {
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
        RotationStrategy::Never => {
            let path = file.directory.join(format!("{}.log", file.prefix));
            let to_error = |e: std::io::Error| LoggingError::LogFile {
                path: path.clone(),
                reason: e.to_string(),
            };
            fs::create_dir_all(&file.directory).map_err(to_error)?;
            let handle = File::create(&path).map_err(to_error)?;
            return Ok(tracing_appender::non_blocking(handle));
        }
    };

    let appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&file.prefix)
        .filename_suffix("jsonl")
        .build(&file.directory)
        .map_err(|e| LoggingError::LogFile {
            path: file.directory.clone(),
            reason: e.to_string(),
        })?;
    Ok(tracing_appender::non_blocking(appender))
}

/// JSONL to stdout at `info`
pub fn init_default() -> Result<Option<WorkerGuard>, LoggingError> {
    SubscriberBuilder::new().init()
}

pub fn init_development() -> Result<Option<WorkerGuard>, LoggingError> {
    SubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
}

/// Warnings only; safe to call from every test
pub fn init_testing() {
    let _ = SubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_to_jsonl_console() {
        let builder = SubscriberBuilder::new();
        assert_eq!(builder.config().default_level, "info");
        assert!(builder.config().console.enabled);
        assert!(!builder.config().console.pretty);
    }

    #[test]
    fn test_builder_setters() {
        let builder = SubscriberBuilder::new()
            .with_level("trace")
            .with_console(false)
            .with_file_output(FileConfig::default());
        assert_eq!(builder.config().default_level, "trace");
        assert!(!builder.config().console.enabled);
        assert!(builder.config().file.is_some());
    }

    #[test]
    fn test_invalid_directive_is_an_error() {
        let result = SubscriberBuilder::new()
            .ignore_env()
            .with_level("info,storage=loudest")
            .build();
        assert!(matches!(result, Err(LoggingError::Filter { .. })));
    }

    #[test]
    fn test_never_rotation_creates_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = FileConfig {
            directory: dir.path().join("nested"),
            prefix: "diag".to_string(),
            rotation: RotationStrategy::Never,
        };
        let (_writer, _guard) = file_writer(&file).unwrap();
        assert!(dir.path().join("nested").join("diag.log").exists());
    }
}
