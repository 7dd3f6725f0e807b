//! Visit and user identifiers kept in cookies.

use super::cookies::CookieJar;
use chrono::{DateTime, Duration, Utc};

/// Idle window after which a visit ends.
pub const VISIT_TTL_HOURS: f64 = 0.5;

/// Lifetime of the user id cookie.
pub const USER_TTL_HOURS: f64 = 24.0 * 365.0;

/// Millisecond timestamp followed by a random number below 1000.
pub fn generate_token(now: DateTime<Utc>) -> String {
    let random: u32 = rand::random_range(0..1000);
    format!("{}{}", now.timestamp_millis(), random)
}

/// Read an id cookie, creating it when absent.
///
/// The cookie is written back on every call so its lifetime slides forward;
/// repeated calls inside that lifetime return the same id.
pub fn get_or_create_id(
    jar: &dyn CookieJar,
    name: &str,
    ttl: Option<Duration>,
    fallback: Option<&str>,
) -> String {
    let id = jar.get(name).unwrap_or_else(|| match fallback {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => generate_token(Utc::now()),
    });
    jar.set(name, &id, ttl);
    id
}

/// Whether the visit cookie is absent.
///
/// Must be asked before [`get_or_create_id`] creates the cookie.
pub fn is_new_visit(jar: &dyn CookieJar, visit_cookie: &str) -> bool {
    jar.get(visit_cookie).is_none()
}
