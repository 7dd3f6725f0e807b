//! Visitor and session identity.
//!
//! Three identifiers describe a browser:
//! - `visit_id`, which lapses after 30 idle minutes,
//! - `user_id`, kept for a year by the sensor,
//! - `global_id`, kept for a year by the collector on its own domain, and
//!   replaced by an opt-out sentinel when the visitor declines tracking.

pub mod cookies;
pub mod global;
pub mod ids;

// Re-export commonly used types
pub use cookies::{ttl_from_hours, CookieJar, MemoryCookieJar};
pub use global::{
    parent_cookie_domain, parse_cookie_header, resolve_global_identity, set_cookie_header,
    GlobalIdentity,
};
pub use ids::{generate_token, get_or_create_id, is_new_visit, USER_TTL_HOURS, VISIT_TTL_HOURS};
