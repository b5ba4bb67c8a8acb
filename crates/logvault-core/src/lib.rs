//! # logvault core
//!
//! Record types, policies and contracts shared by the logvault crates.
//!
//! ## Key Types
//!
//! - [`LogRecord`]: immutable structured log event, identified by its id
//! - [`Severity`]: ordered level from trace to fatal
//! - [`Value`]: closed set of metadata value types
//! - [`Ring`]: fixed-capacity ring that overwrites its oldest entry
//! - [`BufferPolicy`] / [`SamplingPolicy`]: immutable policy values
//! - [`LoggerConfig`]: layered pipeline configuration
//! - [`Span`]: a timed section of work, reported as a record when it ends
//!
//! ## Contracts
//!
//! - [`Sink`]: destination for finalized batches
//! - [`Formatter`]: record to text
//! - [`ContextProvider`]: ambient user/session context

pub mod config;
pub mod context;
pub mod error;
pub mod policy;
pub mod record;
pub mod ring;
pub mod severity;
pub mod sink;
pub mod span;
pub mod value;

pub use config::LoggerConfig;
pub use context::{ContextProvider, Environment, StaticContextProvider, UserContext};
pub use error::{ParseSeverityError, RingError, SinkError};
pub use policy::{BufferPolicy, SamplingPolicy};
pub use record::{CallSite, DEFAULT_CATEGORY, LogRecord};
pub use ring::Ring;
pub use severity::Severity;
pub use sink::{Formatter, Sink, SinkState};
pub use span::{SPAN_CATEGORY, Span};
pub use value::{Metadata, Value};
