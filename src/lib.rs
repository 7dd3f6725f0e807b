//! PageBeacon - Browser visitor/session telemetry with a script-tag collector.
//!
//! A sensor on the page records page views, exits, downloads and custom
//! events, each tied to a visit id, a user id and a collector-wide global id.
//! The collector writes one pipe-delimited line per event to its event log.
//!
//! # Privacy
//!
//! - **Opt-out is honored**: a browser carrying the opt-out cookie is never
//!   logged and receives no identity
//! - **Bounded identity**: visits lapse after 30 idle minutes, user and
//!   global ids after a year
//! - **Transparency**: recorded and declined events are counted and auditable
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          PageBeacon                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Sensor    │──▶│  Transport  │──▶│  Collector  │       │
//! │  │  (cookies)  │   │ (GET query) │   │  (server)   │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │         ▲                                    │              │
//! │         │                                    ▼              │
//! │  ┌─────────────┐                     ┌─────────────┐       │
//! │  │  Callbacks  │◀──── ack/script ────│  Event log  │       │
//! │  │  (onEvent)  │                     │   (sink)    │       │
//! │  └─────────────┘                     └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use pagebeacon::client::{ClientConfig, HttpTransport, SensorClient};
//! use pagebeacon::event::EventType;
//! use pagebeacon::identity::MemoryCookieJar;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), pagebeacon::client::ClientError> {
//! let config = ClientConfig::new("http://stats.example.com").with_site("12345", None);
//! let sensor = SensorClient::new(
//!     config,
//!     Arc::new(MemoryCookieJar::new()),
//!     Arc::new(HttpTransport::new()?),
//! );
//!
//! sensor.record_event(EventType::User, "signup", Some("newsletter"))?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod collector;
pub mod config;
pub mod event;
pub mod identity;
pub mod transparency;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use client::{ClientConfig, ClientError, SensorClient};
pub use collector::{CollectOutcome, Collector, EventAck, EventSink};
pub use config::{Config, ConfigError};
pub use event::{EventRequest, EventType, LogRecord, SiteRef, TrackingEvent};
pub use identity::{CookieJar, GlobalIdentity, MemoryCookieJar};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Privacy declaration that can be displayed to users.
pub const PRIVACY_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║                PAGEBEACON - PRIVACY DECLARATION                  ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This collector records how visitors move through a site.       ║
║                                                                  ║
║  ✓ WHAT WE RECORD:                                               ║
║    • Which pages are viewed and left, and when                   ║
║    • Which downloads and tracked links are followed              ║
║    • Browser details on the first event of a visit               ║
║    • Random visit, user and global ids kept in cookies           ║
║                                                                  ║
║  ✗ WHAT WE NEVER RECORD:                                         ║
║    • Anything from a browser carrying the opt-out cookie         ║
║    • Form contents, unless the page sends them explicitly        ║
║    • Keystrokes, cursor position or screen content               ║
║                                                                  ║
║  Visits end after 30 idle minutes. Ids expire after a year.      ║
║                                                                  ║
║  You can view collection statistics anytime with:                ║
║    GET /stats on the collector                                   ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
