//! Event and identity types shared by the sensor and the collector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of observed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// A page finished loading
    Page,
    /// The visitor left a page
    Exit,
    /// A downloadable file link was clicked
    File,
    /// Custom event raised by the host page
    User,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Page => "page",
            EventType::Exit => "exit",
            EventType::File => "file",
            EventType::User => "user",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "page" => Ok(EventType::Page),
            "exit" => Ok(EventType::Exit),
            "file" => Ok(EventType::File),
            "user" => Ok(EventType::User),
            _ => Err(()),
        }
    }
}

/// Site being measured, with an optional channel within it.
///
/// Travels as `"<site>"` or `"<site>/<channel>"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRef {
    pub site: String,
    pub channel: Option<String>,
}

impl SiteRef {
    pub fn new(site: impl Into<String>, channel: Option<String>) -> Self {
        Self {
            site: site.into(),
            channel: channel.filter(|c| !c.is_empty() && c != "0"),
        }
    }

    /// Parse the wire form. Empty or `"0"` sites yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (site, channel) = match raw.split_once('/') {
            Some((site, channel)) => (site.trim(), Some(channel.trim().to_string())),
            None => (raw.trim(), None),
        };
        if site.is_empty() || site == "0" {
            return None;
        }
        Some(Self::new(site, channel))
    }
}

impl fmt::Display for SiteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.channel {
            Some(channel) => write!(f, "{}/{}", self.site, channel),
            None => f.write_str(&self.site),
        }
    }
}

/// Browser environment, only reported on the first event of a visit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub flash_version: String,
    pub java_version: String,
    pub javascript: String,
    pub clock_time: String,
    pub color_depth: i64,
    pub resolution: String,
    pub language: String,
    pub user_agent: String,
}

/// One event as finalized by the collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub site: SiteRef,
    pub host_ip: String,
    pub received_at: DateTime<Utc>,
    pub load_time_ms: i64,
    pub event_type: Option<EventType>,
    pub name: String,
    pub desc: String,
    pub class: String,
    pub visit_id: String,
    pub user_id: String,
    pub global_id: String,
    /// Whether the sensor's own identity cookies were present
    pub cookies_enabled: bool,
    pub campaign: String,
    pub referrer_link_index: i64,
    pub referrer: String,
    pub new_visit: bool,
    /// Present only when `new_visit` is set
    pub environment: Option<Environment>,
}
