//! Durable visitor identity, resolved by the collector.

use crate::event::escape::{escape, unescape};
use chrono::{DateTime, Duration, Utc};
use cookie::time::OffsetDateTime;
use cookie::{Cookie, Expiration};
use std::collections::HashMap;
use std::net::IpAddr;

/// Lifetime of the global id cookie.
pub const GLOBAL_ID_TTL_DAYS: i64 = 365;

/// Outcome of looking up the global id cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalIdentity {
    /// The browser already carries a global id
    Existing(String),
    /// No global id yet; seeded from the user id and must be set
    Seeded(String),
    /// The browser opted out; nothing may be recorded
    OptedOut,
}

impl GlobalIdentity {
    pub fn id(&self) -> Option<&str> {
        match self {
            GlobalIdentity::Existing(id) | GlobalIdentity::Seeded(id) => Some(id),
            GlobalIdentity::OptedOut => None,
        }
    }
}

/// Parse a `Cookie` request header. Values are unescaped; pairs that do not
/// parse are skipped.
pub fn parse_cookie_header(header: &str) -> HashMap<String, String> {
    Cookie::split_parse(header)
        .filter_map(Result::ok)
        .map(|cookie| (cookie.name().to_string(), unescape(cookie.value())))
        .collect()
}

/// Decide the global id for a request.
///
/// The opt-out sentinel wins over everything else.
pub fn resolve_global_identity(
    cookies: &HashMap<String, String>,
    cookie_name: &str,
    opt_out_value: &str,
    user_id: &str,
) -> GlobalIdentity {
    match cookies.get(cookie_name).map(String::as_str) {
        Some(value) if value == opt_out_value => GlobalIdentity::OptedOut,
        Some(value) if !value.is_empty() => GlobalIdentity::Existing(value.to_string()),
        _ => GlobalIdentity::Seeded(user_id.to_string()),
    }
}

/// Cookie domain covering the host's parent: `www.example.com` becomes
/// `.example.com`.
///
/// Returns `None` (host-only cookie) for IP addresses, single-label hosts and
/// hosts whose parent would be a bare top-level domain.
pub fn parent_cookie_domain(host: &str) -> Option<String> {
    let host = strip_port(host);
    if host.parse::<IpAddr>().is_ok() {
        return None;
    }

    let (_, parent) = host.split_once('.')?;

    // parent must keep at least two labels, e.g. "example.com"
    let labels_ok = parent.split('.').all(|label| !label.is_empty());
    if labels_ok && parent.contains('.') {
        Some(format!(".{}", parent.to_ascii_lowercase()))
    } else {
        None
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // bracketed IPv6 literal
        return host
            .split(']')
            .next()
            .map(|h| h.trim_start_matches('['))
            .unwrap_or(host);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Build a `Set-Cookie` header value. The value is escaped the way the
/// sensor escapes cookie values.
pub fn set_cookie_header(
    name: &str,
    value: &str,
    expires: DateTime<Utc>,
    domain: Option<&str>,
) -> String {
    let mut cookie = Cookie::new(name.to_string(), escape(value));
    cookie.set_path("/");
    match OffsetDateTime::from_unix_timestamp(expires.timestamp()) {
        Ok(at) => cookie.set_expires(Expiration::DateTime(at)),
        Err(_) => cookie.set_max_age(cookie::time::Duration::days(GLOBAL_ID_TTL_DAYS)),
    }
    if let Some(domain) = domain {
        cookie.set_domain(domain.to_string());
    }
    cookie.to_string()
}

/// Expiry for a global id cookie written at `now`.
pub fn global_id_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::days(GLOBAL_ID_TTL_DAYS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_cookie_header() {
        let cookies = parse_cookie_header("pb_global_id=123; theme=dark%20blue;broken; =x");
        assert_eq!(cookies.get("pb_global_id").map(String::as_str), Some("123"));
        assert_eq!(cookies.get("theme").map(String::as_str), Some("dark blue"));
        assert_eq!(cookies.len(), 2);
    }

    #[test]
    fn test_resolve_existing_and_seeded() {
        let mut cookies = HashMap::new();
        assert_eq!(
            resolve_global_identity(&cookies, "gid", "optout", "u1"),
            GlobalIdentity::Seeded("u1".to_string())
        );

        cookies.insert("gid".to_string(), "g9".to_string());
        assert_eq!(
            resolve_global_identity(&cookies, "gid", "optout", "u1"),
            GlobalIdentity::Existing("g9".to_string())
        );
    }

    #[test]
    fn test_resolve_opt_out() {
        let mut cookies = HashMap::new();
        cookies.insert("gid".to_string(), "optout".to_string());
        let identity = resolve_global_identity(&cookies, "gid", "optout", "u1");
        assert_eq!(identity, GlobalIdentity::OptedOut);
        assert_eq!(identity.id(), None);
    }

    #[test]
    fn test_parent_cookie_domain() {
        assert_eq!(
            parent_cookie_domain("www.example.com").as_deref(),
            Some(".example.com")
        );
        assert_eq!(
            parent_cookie_domain("stats.example.co.uk:8080").as_deref(),
            Some(".example.co.uk")
        );
        assert_eq!(
            parent_cookie_domain("my-stats.example.com").as_deref(),
            Some(".example.com")
        );
        assert_eq!(
            parent_cookie_domain("a.my-site.example.org").as_deref(),
            Some(".my-site.example.org")
        );
        assert_eq!(parent_cookie_domain("example.com"), None);
        assert_eq!(parent_cookie_domain("www.example."), None);
        assert_eq!(parent_cookie_domain("localhost:3000"), None);
        assert_eq!(parent_cookie_domain("127.0.0.1:8080"), None);
        assert_eq!(parent_cookie_domain("[::1]:8080"), None);
    }

    #[test]
    fn test_set_cookie_header() {
        let now = Utc.with_ymd_and_hms(2015, 12, 1, 20, 0, 0).unwrap();
        let header = set_cookie_header("gid", "123", global_id_expiry(now), Some(".example.com"));

        let cookie = Cookie::parse(header.as_str()).unwrap();
        assert_eq!(cookie.name(), "gid");
        assert_eq!(cookie.value(), "123");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.domain(), Some("example.com"));
        // 2016 is a leap year
        assert!(header.contains("Expires=Wed, 30 Nov 2016 20:00:00 GMT"));
    }

    #[test]
    fn test_set_cookie_header_escapes_value() {
        let now = Utc.with_ymd_and_hms(2015, 12, 1, 20, 0, 0).unwrap();
        let header = set_cookie_header("gid", "a b;c", global_id_expiry(now), None);
        assert!(header.starts_with("gid=a%20b%3Bc;"));
        assert!(!header.contains("Domain="));

        let parsed = parse_cookie_header("gid=a%20b%3Bc");
        assert_eq!(parsed.get("gid").map(String::as_str), Some("a b;c"));
    }
}
