//! The event log line.
//!
//! ```text
//! event:si=12|ip=10.0.0.1|tm=1449000000|lt=0|et=page|en=...|ed=...|...
//! ```
//!
//! Fields appear in a fixed order. The browser environment block (`fl` to
//! `ua`) is only appended for the first event of a visit.

use super::escape::{
    decode_log_markup_field, decode_log_query_field, log_markup_field, log_query_field,
};
use super::types::TrackingEvent;

/// Prefix that marks an event line in the log stream.
pub const RECORD_PREFIX: &str = "event:";

/// Keys of the fields every record carries, in order.
pub const CORE_KEYS: [&str; 15] = [
    "si", "ip", "tm", "lt", "et", "en", "ed", "ec", "vi", "ui", "gi", "co", "ca", "ri", "re",
];

/// Keys appended for new visits, in order.
pub const ENVIRONMENT_KEYS: [&str; 8] = ["fl", "ja", "js", "ct", "cb", "sr", "la", "ua"];

/// A formatted or parsed log record as ordered key/value pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    fields: Vec<(String, String)>,
}

/// Errors from reading a log line back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogParseError {
    /// The line does not start with the record prefix
    NotAnEvent,
    /// A field had no `=` separator
    MalformedField(String),
}

impl std::fmt::Display for LogParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogParseError::NotAnEvent => write!(f, "Line is not an event record"),
            LogParseError::MalformedField(field) => write!(f, "Malformed field: {field}"),
        }
    }
}

impl std::error::Error for LogParseError {}

impl LogRecord {
    /// Build the record for a finalized event.
    pub fn from_event(event: &TrackingEvent) -> Self {
        let q = log_query_field;
        let mut fields = vec![
            ("si", q(&event.site.to_string())),
            ("ip", q(&event.host_ip)),
            ("tm", event.received_at.timestamp().to_string()),
            ("lt", event.load_time_ms.to_string()),
            (
                "et",
                event.event_type.map(|t| t.to_string()).unwrap_or_default(),
            ),
            ("en", q(&event.name)),
            ("ed", log_markup_field(&event.desc)),
            ("ec", q(&event.class)),
            ("vi", q(&event.visit_id)),
            ("ui", q(&event.user_id)),
            ("gi", q(&event.global_id)),
            (
                "co",
                if event.cookies_enabled { "yes" } else { "no" }.to_string(),
            ),
            ("ca", q(&event.campaign)),
            ("ri", event.referrer_link_index.to_string()),
            ("re", q(&event.referrer)),
        ];

        if event.new_visit {
            let env = event.environment.clone().unwrap_or_default();
            fields.extend([
                ("fl", q(&env.flash_version)),
                ("ja", q(&env.java_version)),
                ("js", q(&env.javascript)),
                ("ct", q(&env.clock_time)),
                ("cb", env.color_depth.to_string()),
                ("sr", q(&env.resolution)),
                ("la", q(&env.language)),
                ("ua", q(&env.user_agent)),
            ]);
        }

        Self {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    /// Read a log line back into its fields. Values stay encoded.
    pub fn parse(line: &str) -> Result<Self, LogParseError> {
        let body = line
            .trim_end_matches(['\r', '\n'])
            .strip_prefix(RECORD_PREFIX)
            .ok_or(LogParseError::NotAnEvent)?;

        let fields = body
            .split('|')
            .map(|field| {
                field
                    .split_once('=')
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .ok_or_else(|| LogParseError::MalformedField(field.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { fields })
    }

    /// Format as a single log line, without a trailing newline.
    pub fn to_line(&self) -> String {
        let body = self
            .fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("|");
        format!("{RECORD_PREFIX}{body}")
    }

    /// Raw (still encoded) value of a field.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Decoded value of a query-encoded field.
    pub fn decoded(&self, key: &str) -> Option<String> {
        self.get(key).map(decode_log_query_field)
    }

    pub fn event_name(&self) -> Option<String> {
        self.decoded("en")
    }

    pub fn event_desc(&self) -> Option<String> {
        self.get("ed").map(decode_log_markup_field)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record carries the new-visit environment block.
    pub fn has_environment(&self) -> bool {
        self.get(ENVIRONMENT_KEYS[0]).is_some()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::types::{Environment, EventType, SiteRef};
    use chrono::{TimeZone, Utc};

    fn sample_event(new_visit: bool) -> TrackingEvent {
        TrackingEvent {
            site: SiteRef::parse("12345/2").unwrap(),
            host_ip: "10.0.0.1".to_string(),
            received_at: Utc.with_ymd_and_hms(2015, 12, 1, 20, 0, 0).unwrap(),
            load_time_ms: 820,
            event_type: Some(EventType::Page),
            name: "a|b".to_string(),
            desc: "a|b".to_string(),
            class: String::new(),
            visit_id: "1448990000000123".to_string(),
            user_id: "1448000000000456".to_string(),
            global_id: "1448000000000456".to_string(),
            cookies_enabled: true,
            campaign: String::new(),
            referrer_link_index: 0,
            referrer: "http://b.example/".to_string(),
            new_visit,
            environment: new_visit.then(|| Environment {
                flash_version: "no".to_string(),
                java_version: "1.8".to_string(),
                javascript: "yes".to_string(),
                clock_time: "21:00:00".to_string(),
                color_depth: 24,
                resolution: "1280x800".to_string(),
                language: "en-GB".to_string(),
                user_agent: "Mozilla/5.0".to_string(),
            }),
        }
    }

    #[test]
    fn test_short_and_long_forms() {
        let short = LogRecord::from_event(&sample_event(false));
        assert_eq!(short.field_count(), CORE_KEYS.len());
        assert!(!short.has_environment());

        let long = LogRecord::from_event(&sample_event(true));
        assert_eq!(long.field_count(), CORE_KEYS.len() + ENVIRONMENT_KEYS.len());
        assert_eq!(long.get("ua"), Some("Mozilla/5.0"));
    }

    #[test]
    fn test_field_order() {
        let record = LogRecord::from_event(&sample_event(true));
        let keys: Vec<&str> = record.fields().map(|(k, _)| k).collect();
        let expected: Vec<&str> = CORE_KEYS.iter().chain(ENVIRONMENT_KEYS.iter()).copied().collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_line_format() {
        let line = LogRecord::from_event(&sample_event(false)).to_line();
        assert!(line.starts_with("event:si=12345/2|ip=10.0.0.1|tm=1449000000|lt=820|et=page|"));
        assert!(line.contains("|en=a%7Cb|ed=a&#124;b|"));
        assert!(line.contains("|co=yes|"));
    }

    #[test]
    fn test_pipes_decode_back() {
        let line = LogRecord::from_event(&sample_event(false)).to_line();
        let parsed = LogRecord::parse(&line).unwrap();

        assert_eq!(parsed.field_count(), CORE_KEYS.len());
        assert_eq!(parsed.get("en"), Some("a%7Cb"));
        assert_eq!(parsed.event_name().as_deref(), Some("a|b"));
        assert_eq!(parsed.get("ed"), Some("a&#124;b"));
        assert_eq!(parsed.event_desc().as_deref(), Some("a|b"));
    }

    #[test]
    fn test_parse_rejects_foreign_lines() {
        assert_eq!(
            LogRecord::parse("GET / HTTP/1.1"),
            Err(LogParseError::NotAnEvent)
        );
        assert!(matches!(
            LogRecord::parse("event:si=1|oops"),
            Err(LogParseError::MalformedField(_))
        ));
    }
}
