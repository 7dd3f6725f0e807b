//! Wire contract shared by the sensor and the collector.
//!
//! This module contains:
//! - The typed collector request and its query-string codec
//! - Escaping for the query string, the event log and script literals
//! - The pipe-delimited event log record
//! - The clock-based time zone estimate

pub mod escape;
pub mod record;
pub mod request;
pub mod timezone;
pub mod types;

// Re-export commonly used types
pub use record::{LogParseError, LogRecord};
pub use request::{EventRequest, RequestError};
pub use timezone::{compute_time_zone_offset, normalize_clock_time};
pub use types::{Environment, EventType, SiteRef, TrackingEvent};
