//! Collector activity counters.
//!
//! Counts what the collector did without keeping anything about who it did
//! it for. Opt-outs are counted, never logged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Activity counters for the running collector.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Events written to the event log
    events_recorded: AtomicU64,
    /// Recorded events that started a visit
    new_visits: AtomicU64,
    /// Requests dropped because the browser opted out
    opt_outs_honored: AtomicU64,
    /// Requests dropped for lacking a site id
    requests_rejected: AtomicU64,
    /// Events lost because the event log could not be written
    log_write_failures: AtomicU64,
    /// When the collector started
    started_at: DateTime<Utc>,
}

impl TransparencyLog {
    /// Create a new transparency log.
    pub fn new() -> Self {
        Self {
            events_recorded: AtomicU64::new(0),
            new_visits: AtomicU64::new(0),
            opt_outs_honored: AtomicU64::new(0),
            requests_rejected: AtomicU64::new(0),
            log_write_failures: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    /// Record an event written to the log.
    pub fn record_event(&self, new_visit: bool) {
        self.events_recorded.fetch_add(1, Ordering::Relaxed);
        if new_visit {
            self.new_visits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_opt_out(&self) {
        self.opt_outs_honored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.requests_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.log_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            events_recorded: self.events_recorded.load(Ordering::Relaxed),
            new_visits: self.new_visits.load(Ordering::Relaxed),
            opt_outs_honored: self.opt_outs_honored.load(Ordering::Relaxed),
            requests_rejected: self.requests_rejected.load(Ordering::Relaxed),
            log_write_failures: self.log_write_failures.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Collector Statistics:\n\
             - Events recorded: {}\n\
             - New visits: {}\n\
             - Opt-outs honored: {}\n\
             - Requests without a site: {}\n\
             - Event log write failures: {}\n\
             - Uptime: {} seconds",
            stats.events_recorded,
            stats.new_visits,
            stats.opt_outs_honored,
            stats.requests_rejected,
            stats.log_write_failures,
            stats.uptime_secs
        )
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.events_recorded.store(0, Ordering::Relaxed);
        self.new_visits.store(0, Ordering::Relaxed);
        self.opt_outs_honored.store(0, Ordering::Relaxed);
        self.requests_rejected.store(0, Ordering::Relaxed);
        self.log_write_failures.store(0, Ordering::Relaxed);
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub events_recorded: u64,
    pub new_visits: u64,
    pub opt_outs_honored: u64,
    pub requests_rejected: u64,
    pub log_write_failures: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

/// Create a new shared transparency log.
pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}
