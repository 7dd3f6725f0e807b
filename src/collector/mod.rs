//! Event collection on the tracking domain.
//!
//! This module turns one collector request into at most one event log line
//! and an acknowledgment for the page:
//! - [`Collector`] validates, finalizes identity and writes the log record
//! - [`EventSink`] implementations receive the log lines
//! - [`EventAck`] and [`render_callback_script`] describe the result to the page

pub mod ack;
pub mod process;
pub mod script;
pub mod sink;

// Re-export commonly used types
pub use ack::EventAck;
pub use process::{CollectOutcome, Collector, RecordedEvent, RejectReason, RequestContext};
pub use script::render_callback_script;
pub use sink::{EventSink, FileSink, MemorySink, SinkError, TracingSink, EVENT_LOG_TARGET};
