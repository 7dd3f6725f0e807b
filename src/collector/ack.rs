//! What the collector tells the page about a recorded event.

use crate::event::{Environment, TrackingEvent};
use serde::{Deserialize, Serialize};

/// The collector's view of a recorded event.
///
/// Returned as JSON by the structured endpoint and mirrored into the page by
/// the callback script. Text fields hold the raw, unescaped values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAck {
    pub site: String,
    pub event_type: String,
    pub event_name: String,
    pub event_desc: String,
    pub event_class: String,
    pub visit_id: String,
    pub user_id: String,
    pub global_id: String,
    pub new_visit: bool,
    pub referrer: String,
    pub campaign: String,
    pub host_ip: String,
    /// Zero-padded `HH:MM:SS`; empty when the sensor sent no clock
    pub clock_time: String,
    /// Estimated hours from UTC, in `[-12, 12]`; only known with a clock
    pub time_zone: Option<i32>,
    pub load_time: i64,
    pub color_depth: i64,
    pub resolution: String,
    pub language: String,
    pub user_agent: String,
    pub java_version: String,
    pub flash_version: String,
}

impl EventAck {
    pub fn new(
        event: &TrackingEvent,
        environment: &Environment,
        clock_time: String,
        time_zone: Option<i32>,
    ) -> Self {
        Self {
            site: event.site.to_string(),
            event_type: event.event_type.map(|t| t.to_string()).unwrap_or_default(),
            event_name: event.name.clone(),
            event_desc: event.desc.clone(),
            event_class: event.class.clone(),
            visit_id: event.visit_id.clone(),
            user_id: event.user_id.clone(),
            global_id: event.global_id.clone(),
            new_visit: event.new_visit,
            referrer: event.referrer.clone(),
            campaign: event.campaign.clone(),
            host_ip: event.host_ip.clone(),
            clock_time,
            time_zone,
            load_time: event.load_time_ms,
            color_depth: environment.color_depth,
            resolution: environment.resolution.clone(),
            language: environment.language.clone(),
            user_agent: environment.user_agent.clone(),
            java_version: environment.java_version.clone(),
            flash_version: environment.flash_version.clone(),
        }
    }

    /// Field names and values in the order the callback script assigns them.
    pub fn script_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("site", self.site.clone()),
            ("eventType", self.event_type.clone()),
            ("visitId", self.visit_id.clone()),
            ("userId", self.user_id.clone()),
            ("globalId", self.global_id.clone()),
            ("newVisit", self.new_visit.to_string()),
            ("referrer", self.referrer.clone()),
            ("campaign", self.campaign.clone()),
            ("hostIp", self.host_ip.clone()),
            ("clockTime", self.clock_time.clone()),
            (
                "timeZone",
                self.time_zone.map(|tz| tz.to_string()).unwrap_or_default(),
            ),
            ("loadTime", self.load_time.to_string()),
            ("eventName", self.event_name.clone()),
            ("eventDesc", self.event_desc.clone()),
            ("eventClass", self.event_class.clone()),
            ("colorDepth", self.color_depth.to_string()),
            ("resolution", self.resolution.clone()),
            ("language", self.language.clone()),
            ("userAgent", self.user_agent.clone()),
            ("javaVersion", self.java_version.clone()),
            ("flashVersion", self.flash_version.clone()),
        ]
    }
}
