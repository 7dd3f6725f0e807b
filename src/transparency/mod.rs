//! Transparency module for the pagebeacon collector.
//!
//! Exposes counts of what the collector recorded and what it declined to
//! record, so operators can audit opt-out handling.

pub mod log;

// Re-export commonly used types
pub use log::{create_shared_log, SharedTransparencyLog, TransparencyLog, TransparencyStats};
