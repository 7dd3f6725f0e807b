//! Cookie storage as seen by the sensor.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Cookie storage the sensor reads and writes its identity through.
///
/// An empty value reads back as absent.
pub trait CookieJar: Send + Sync {
    /// Read a cookie that has not expired.
    fn get(&self, name: &str) -> Option<String>;

    /// Write a cookie. `None` means it lasts for the browser session.
    fn set(&self, name: &str, value: &str, ttl: Option<Duration>);

    /// Delete a cookie.
    fn remove(&self, name: &str);
}

/// Convert a lifetime given in (possibly fractional) hours.
pub fn ttl_from_hours(hours: f64) -> Duration {
    Duration::milliseconds((hours * 3_600_000.0).round() as i64)
}

#[derive(Debug, Clone)]
struct StoredCookie {
    value: String,
    expires: Option<DateTime<Utc>>,
}

/// In-memory cookie jar with expiry.
///
/// Time can be moved forward with [`MemoryCookieJar::advance`] to simulate
/// idle periods.
#[derive(Debug)]
pub struct MemoryCookieJar {
    cookies: Mutex<HashMap<String, StoredCookie>>,
    skew: Mutex<Duration>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self {
            cookies: Mutex::new(HashMap::new()),
            skew: Mutex::new(Duration::zero()),
        }
    }

    /// Current time as the jar sees it.
    pub fn now(&self) -> DateTime<Utc> {
        Utc::now() + *self.skew.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move the jar's clock forward.
    pub fn advance(&self, by: Duration) {
        let mut skew = self.skew.lock().unwrap_or_else(|e| e.into_inner());
        *skew += by;
    }

    /// Names of all live cookies, sorted.
    pub fn names(&self) -> Vec<String> {
        let now = self.now();
        let cookies = self.cookies.lock().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = cookies
            .iter()
            .filter(|(_, c)| c.expires.map_or(true, |e| e > now))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

impl Default for MemoryCookieJar {
    fn default() -> Self {
        Self::new()
    }
}

impl CookieJar for MemoryCookieJar {
    fn get(&self, name: &str) -> Option<String> {
        let now = self.now();
        let mut cookies = self.cookies.lock().unwrap_or_else(|e| e.into_inner());

        let expired = cookies
            .get(name)
            .and_then(|c| c.expires)
            .is_some_and(|e| e <= now);
        if expired {
            cookies.remove(name);
            return None;
        }

        cookies
            .get(name)
            .map(|c| c.value.clone())
            .filter(|v| !v.is_empty())
    }

    fn set(&self, name: &str, value: &str, ttl: Option<Duration>) {
        let expires = ttl.map(|ttl| self.now() + ttl);
        let mut cookies = self.cookies.lock().unwrap_or_else(|e| e.into_inner());
        cookies.insert(
            name.to_string(),
            StoredCookie {
                value: value.to_string(),
                expires,
            },
        );
    }

    fn remove(&self, name: &str) {
        let mut cookies = self.cookies.lock().unwrap_or_else(|e| e.into_inner());
        cookies.remove(name);
    }
}
