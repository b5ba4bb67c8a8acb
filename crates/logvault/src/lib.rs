//! # logvault
//!
//! Structured application logging with redaction, sampling, buffering and
//! crash-safe retention of recent records.
//!
//! ## Pipeline
//!
//! Every record handed to a [`Logger`] passes, in order, the severity and
//! category gate, the [`Sampler`], the ambient [`ContextProvider`], the
//! [`Sanitizer`], the [`CrashPreserver`] ring and finally the [`Buffer`] (or
//! straight to the sinks when unbuffered).
//!
//! Timed sections are opened with [`Logger::start_span`] and reported as a
//! debug record carrying `duration_ms` when [`Logger::end_span`] closes them.
//!
//! ## Example
//!
//! ```rust,ignore
//! use logvault::{LoggerBuilder, MemorySink, BufferPolicy};
//!
//! let logger = LoggerBuilder::new()
//!     .add_sink(MemorySink::new())
//!     .with_buffer(BufferPolicy::default())
//!     .with_default_sanitizer()
//!     .build()
//!     .await?;
//!
//! logvault::info!(logger, "signed in as {}", email).await;
//! logger.shutdown().await;
//! ```

pub mod buffer;
pub mod builder;
pub mod error;
pub mod formatter;
pub mod global;
pub mod logger;
mod macros;
pub mod sampler;
pub mod sanitizer;
pub mod sinks;
pub mod tracer;

pub use buffer::{Buffer, FlushHandler};
pub use builder::LoggerBuilder;
pub use error::{BuildError, SanitizerError};
pub use formatter::{JsonFormatter, PrettyFormatter};
pub use logger::Logger;
pub use sampler::Sampler;
pub use sanitizer::{PatternSpec, Sanitizer, SanitizerBuilder};
pub use sinks::{ConsoleSink, ConsoleStream, MemorySink};
pub use tracer::SpanTracer;

pub use logvault_core::{
    BufferPolicy, CallSite, ContextProvider, DEFAULT_CATEGORY, Environment, Formatter, LogRecord,
    LoggerConfig, Metadata, SPAN_CATEGORY, SamplingPolicy, Severity, Sink, SinkError, SinkState,
    Span, StaticContextProvider, UserContext, Value, call_site,
};
pub use logvault_crash::{CrashPreserver, CrashReport, PreserveError, PreserverConfig, Recovery};
