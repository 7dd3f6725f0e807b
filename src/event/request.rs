//! The collector request: one GET query string per event.

use super::escape::{escape, unescape};
use super::types::{EventType, SiteRef};
use serde::{Deserialize, Serialize};

/// Typed form of the collector query string.
///
/// Missing or malformed values degrade to empty/zero; only the site is
/// required, and that is checked by [`EventRequest::require_site`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRequest {
    pub site: Option<SiteRef>,
    pub event_type: Option<EventType>,
    pub name: String,
    pub desc: String,
    pub class: String,
    pub load_time_ms: i64,
    pub visit_id: Option<String>,
    pub user_id: Option<String>,
    pub campaign: String,
    pub referrer: String,
    /// 1-based index of the link clicked on the previous page, 0 for none
    pub refer_id: i64,
    pub new_visit: bool,
    pub flash: Option<String>,
    pub java: Option<String>,
    pub javascript: Option<String>,
    pub clock_time: String,
    pub color_bits: i64,
    pub resolution: String,
}

/// Errors from validating a collector request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The `site` parameter was absent, empty or zero
    MissingSite,
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestError::MissingSite => write!(f, "Request has no site id"),
        }
    }
}

impl std::error::Error for RequestError {}

impl EventRequest {
    /// Decode a raw query string (without the leading `?`).
    ///
    /// Unknown keys are ignored. Later duplicates win.
    pub fn parse_query(raw: &str) -> Self {
        let mut request = Self::default();

        for pair in raw.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = unescape(key);
            let value = unescape(value);

            match key.as_str() {
                "site" => request.site = SiteRef::parse(&value),
                "type" => request.event_type = value.parse().ok(),
                "name" => request.name = value,
                "desc" => request.desc = value,
                "class" => request.class = value,
                "load_time" => request.load_time_ms = parse_leading_int(&value),
                "visit_id" => request.visit_id = non_empty(value),
                "user_id" => request.user_id = non_empty(value),
                "campaign" => request.campaign = value,
                "referrer" => request.referrer = value,
                "refer_id" => request.refer_id = parse_leading_int(&value),
                "new_visit" => request.new_visit = value == "true",
                "flash" => request.flash = non_empty(value),
                "java" => request.java = non_empty(value),
                "javascript" => request.javascript = non_empty(value),
                "clock_time" => request.clock_time = value,
                "color_bits" => request.color_bits = parse_leading_int(&value),
                "resolution" => request.resolution = value,
                _ => {}
            }
        }

        request
    }

    /// The explicit validation step: the site is the one required field.
    pub fn require_site(&self) -> Result<&SiteRef, RequestError> {
        self.site.as_ref().ok_or(RequestError::MissingSite)
    }

    /// Encode as a query string for the collector.
    ///
    /// Browser environment parameters are only sent with the first event of
    /// a visit.
    pub fn to_query_string(&self) -> String {
        let mut params: Vec<(&str, String)> = vec![
            (
                "site",
                self.site.as_ref().map(|s| s.to_string()).unwrap_or_default(),
            ),
            (
                "type",
                self.event_type
                    .map(|t| t.as_str().to_string())
                    .unwrap_or_default(),
            ),
            ("name", self.name.clone()),
            ("desc", self.desc.clone()),
            ("class", self.class.clone()),
            ("campaign", self.campaign.clone()),
            ("referrer", self.referrer.clone()),
            (
                "refer_id",
                if self.refer_id > 0 {
                    self.refer_id.to_string()
                } else {
                    String::new()
                },
            ),
            ("new_visit", self.new_visit.to_string()),
            ("visit_id", self.visit_id.clone().unwrap_or_default()),
            ("user_id", self.user_id.clone().unwrap_or_default()),
        ];

        if self.new_visit {
            params.push(("resolution", self.resolution.clone()));
            params.push(("color_bits", self.color_bits.to_string()));
            if let Some(java) = &self.java {
                params.push(("java", java.clone()));
            }
            if let Some(flash) = &self.flash {
                params.push(("flash", flash.clone()));
            }
            if let Some(javascript) = &self.javascript {
                params.push(("javascript", javascript.clone()));
            }
            params.push(("clock_time", self.clock_time.clone()));
        }

        params.push(("load_time", self.load_time_ms.to_string()));

        params
            .iter()
            .map(|(key, value)| format!("{}={}", key, escape(value)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Read the leading integer of a string, the way loosely typed form input is
/// read: `"42ms"` is 42, `"abc"` is 0.
pub fn parse_leading_int(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut value: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        value = value.saturating_mul(10).saturating_add((b - b'0') as i64);
    }

    if negative {
        -value
    } else {
        value
    }
}
