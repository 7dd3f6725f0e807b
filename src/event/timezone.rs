//! Hour-granularity time zone estimate from the visitor's clock.

use super::request::parse_leading_int;

/// Estimate the visitor's UTC offset in hours.
///
/// Takes the hour from the client's `HH:MM:SS` clock time, subtracts the
/// server's UTC hour and folds the result into `[-12, 12]`. An unreadable
/// clock, or an hour outside `0..=23`, counts as hour zero.
pub fn compute_time_zone_offset(clock_time: &str, server_utc_hour: u32) -> i32 {
    let hour = clock_time
        .split(':')
        .next()
        .map(parse_leading_int)
        .filter(|h| (0..=23).contains(h))
        .unwrap_or(0) as i32;
    let mut offset = hour - (server_utc_hour % 24) as i32;
    if offset < -12 {
        offset += 24;
    }
    if offset > 12 {
        offset -= 24;
    }
    offset
}

/// Render a client clock time as zero-padded `HH:MM:SS`.
pub fn normalize_clock_time(clock_time: &str) -> String {
    let mut parts = clock_time.split(':').map(parse_leading_int);
    let hours = parts.next().unwrap_or(0);
    let mins = parts.next().unwrap_or(0);
    let secs = parts.next().unwrap_or(0);
    format!("{hours:02}:{mins:02}:{secs:02}")
}
