//! Per-request processing: validate, finalize identity, log, acknowledge.

use super::ack::EventAck;
use super::sink::{EventSink, SinkError};
use crate::config::Config;
use crate::event::{
    compute_time_zone_offset, normalize_clock_time, Environment, EventRequest, LogRecord,
    TrackingEvent,
};
use crate::identity::global::global_id_expiry;
use crate::identity::{
    parent_cookie_domain, parse_cookie_header, resolve_global_identity, set_cookie_header,
    GlobalIdentity,
};
use crate::transparency::SharedTransparencyLog;
use chrono::{DateTime, Timelike, Utc};
use std::sync::Arc;
use tracing::{debug, error};

/// Request metadata the collector reads besides the query string.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Peer address of the connection
    pub remote_addr: String,
    /// `X-Forwarded-For` header
    pub forwarded_for: Option<String>,
    /// `Accept-Language` header
    pub accept_language: Option<String>,
    /// `User-Agent` header
    pub user_agent: Option<String>,
    /// `Cookie` header
    pub cookie_header: Option<String>,
    /// `Host` header, used to scope the global id cookie
    pub host: Option<String>,
}

impl RequestContext {
    /// Client address as logged: the peer, then any forwarded chain.
    pub fn host_ip(&self) -> String {
        match self.forwarded_for.as_deref().map(str::trim) {
            Some(forward) if !forward.is_empty() => format!("{},{}", self.remote_addr, forward),
            _ => self.remote_addr.clone(),
        }
    }
}

/// Why a request produced no event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingSite,
    OptedOut,
}

/// An event the collector accepted.
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub event: TrackingEvent,
    pub ack: EventAck,
    /// `Set-Cookie` value when the global id was seeded by this request
    pub set_cookie: Option<String>,
    /// Whether the event log write succeeded
    pub logged: bool,
}

/// Result of processing one request.
#[derive(Debug, Clone)]
pub enum CollectOutcome {
    Recorded(Box<RecordedEvent>),
    Rejected(RejectReason),
}

/// Stateless event processor. All state lives in the sink and the cookies.
pub struct Collector {
    global_cookie_name: String,
    opt_out_value: String,
    cookie_domain: Option<String>,
    sink: Arc<dyn EventSink>,
    transparency: SharedTransparencyLog,
}

impl Collector {
    pub fn new(
        config: &Config,
        sink: Arc<dyn EventSink>,
        transparency: SharedTransparencyLog,
    ) -> Self {
        Self {
            global_cookie_name: config.global_cookie_name(),
            opt_out_value: config.opt_out_value.clone(),
            cookie_domain: config.cookie_domain.clone(),
            sink,
            transparency,
        }
    }

    pub fn transparency(&self) -> &SharedTransparencyLog {
        &self.transparency
    }

    /// Process one event request received at `now`.
    pub fn process(
        &self,
        request: &EventRequest,
        context: &RequestContext,
        now: DateTime<Utc>,
    ) -> CollectOutcome {
        let site = match request.require_site() {
            Ok(site) => site.clone(),
            Err(e) => {
                debug!("Dropping request: {}", e);
                self.transparency.record_rejected();
                return CollectOutcome::Rejected(RejectReason::MissingSite);
            }
        };

        // Without both sensor cookies the visit cannot be tied to anything
        // earlier; stand in with a server timestamp.
        let (visit_id, user_id, cookies_enabled) =
            match (request.visit_id.as_ref(), request.user_id.as_ref()) {
                (Some(visit_id), Some(user_id)) => (visit_id.clone(), user_id.clone(), true),
                _ => {
                    let id = fallback_id(now);
                    (id.clone(), id, false)
                }
            };

        let cookies = context
            .cookie_header
            .as_deref()
            .map(parse_cookie_header)
            .unwrap_or_default();
        let identity = resolve_global_identity(
            &cookies,
            &self.global_cookie_name,
            &self.opt_out_value,
            &user_id,
        );

        let (global_id, set_cookie) = match identity {
            GlobalIdentity::OptedOut => {
                self.transparency.record_opt_out();
                return CollectOutcome::Rejected(RejectReason::OptedOut);
            }
            GlobalIdentity::Existing(id) => (id, None),
            GlobalIdentity::Seeded(id) => {
                let domain = self
                    .cookie_domain
                    .clone()
                    .or_else(|| context.host.as_deref().and_then(parent_cookie_domain));
                let cookie = set_cookie_header(
                    &self.global_cookie_name,
                    &id,
                    global_id_expiry(now),
                    domain.as_deref(),
                );
                (id, Some(cookie))
            }
        };

        let environment = environment_from(request, context);
        let event = TrackingEvent {
            site,
            host_ip: context.host_ip(),
            received_at: now,
            load_time_ms: request.load_time_ms,
            event_type: request.event_type,
            name: request.name.clone(),
            desc: request.desc.clone(),
            class: request.class.clone(),
            visit_id,
            user_id,
            global_id,
            cookies_enabled,
            campaign: request.campaign.clone(),
            referrer_link_index: request.refer_id,
            referrer: request.referrer.clone(),
            new_visit: request.new_visit,
            environment: request.new_visit.then(|| environment.clone()),
        };

        let logged = self.emit_log_record(&event).is_ok();

        // the sensor only reports its clock at the start of a visit
        let (clock_time, time_zone) = if request.clock_time.trim().is_empty() {
            (String::new(), None)
        } else {
            (
                normalize_clock_time(&request.clock_time),
                Some(compute_time_zone_offset(&request.clock_time, now.hour())),
            )
        };
        let ack = EventAck::new(&event, &environment, clock_time, time_zone);

        CollectOutcome::Recorded(Box::new(RecordedEvent {
            event,
            ack,
            set_cookie,
            logged,
        }))
    }

    /// Append the event's record to the event log.
    ///
    /// A failed write loses this event only; it is reported and counted.
    pub fn emit_log_record(&self, event: &TrackingEvent) -> Result<(), SinkError> {
        let line = LogRecord::from_event(event).to_line();
        match self.sink.write_line(&line) {
            Ok(()) => {
                self.transparency.record_event(event.new_visit);
                Ok(())
            }
            Err(e) => {
                error!("Event for site {} not recorded: {}", event.site, e);
                self.transparency.record_write_failure();
                Err(e)
            }
        }
    }
}

/// Server-side stand-in id: unix seconds followed by six microsecond digits.
fn fallback_id(now: DateTime<Utc>) -> String {
    format!(
        "{}{:06}",
        now.timestamp(),
        now.timestamp_subsec_micros() % 1_000_000
    )
}

fn environment_from(request: &EventRequest, context: &RequestContext) -> Environment {
    Environment {
        flash_version: request.flash.clone().unwrap_or_else(|| "no".to_string()),
        java_version: request
            .java
            .as_deref()
            .map(|j| j.chars().take(3).collect())
            .unwrap_or_default(),
        javascript: request
            .javascript
            .clone()
            .unwrap_or_else(|| "yes".to_string()),
        clock_time: request.clock_time.clone(),
        color_depth: request.color_bits,
        resolution: request.resolution.clone(),
        language: context
            .accept_language
            .as_deref()
            .unwrap_or_default()
            .replace(['\r', '\n'], " "),
        user_agent: context
            .user_agent
            .as_deref()
            .unwrap_or_default()
            .replace('|', " "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::sink::MemorySink;
    use crate::event::record::{CORE_KEYS, ENVIRONMENT_KEYS};
    use crate::transparency::create_shared_log;
    use chrono::TimeZone;

    struct BrokenSink;

    impl EventSink for BrokenSink {
        fn write_line(&self, _line: &str) -> Result<(), SinkError> {
            Err(SinkError::Io("disk full".to_string()))
        }
    }

    fn collector() -> (Collector, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let collector = Collector::new(&Config::default(), sink.clone(), create_shared_log());
        (collector, sink)
    }

    fn context() -> RequestContext {
        RequestContext {
            remote_addr: "203.0.113.9".to_string(),
            accept_language: Some("en-GB,en;q=0.8".to_string()),
            user_agent: Some("Mozilla/5.0 (X11|Linux)".to_string()),
            host: Some("stats.example.com".to_string()),
            ..Default::default()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 12, 1, 1, 30, 0).unwrap()
    }

    fn recorded(outcome: CollectOutcome) -> RecordedEvent {
        match outcome {
            CollectOutcome::Recorded(event) => *event,
            CollectOutcome::Rejected(reason) => panic!("rejected: {reason:?}"),
        }
    }

    #[test]
    fn test_missing_site_is_rejected_silently() {
        let (collector, sink) = collector();
        let request = EventRequest::parse_query("type=page&name=x&visit_id=1&user_id=2");
        let outcome = collector.process(&request, &context(), now());

        assert!(matches!(
            outcome,
            CollectOutcome::Rejected(RejectReason::MissingSite)
        ));
        assert!(sink.is_empty());
        assert_eq!(collector.transparency().stats().requests_rejected, 1);
    }

    #[test]
    fn test_opt_out_suppresses_everything() {
        let (collector, sink) = collector();
        let request =
            EventRequest::parse_query("site=5&type=page&new_visit=true&visit_id=1&user_id=2");
        let ctx = RequestContext {
            cookie_header: Some("pb_global_id=optout".to_string()),
            ..context()
        };

        let outcome = collector.process(&request, &ctx, now());
        assert!(matches!(
            outcome,
            CollectOutcome::Rejected(RejectReason::OptedOut)
        ));
        assert!(sink.is_empty());
        assert_eq!(collector.transparency().stats().events_recorded, 0);
        assert_eq!(collector.transparency().stats().opt_outs_honored, 1);
    }

    #[test]
    fn test_first_request_seeds_global_id() {
        let (collector, sink) = collector();
        let request = EventRequest::parse_query("site=5&type=page&visit_id=111&user_id=222");
        let event = recorded(collector.process(&request, &context(), now()));

        assert_eq!(event.event.global_id, "222");
        let cookie = event.set_cookie.unwrap();
        assert!(cookie.starts_with("pb_global_id=222; expires="));
        assert!(cookie.ends_with("; path=/; domain=.example.com"));
        assert_eq!(sink.len(), 1);
        assert!(event.logged);
    }

    #[test]
    fn test_existing_global_id_is_reused() {
        let (collector, _sink) = collector();
        let request = EventRequest::parse_query("site=5&type=exit&visit_id=111&user_id=222");
        let ctx = RequestContext {
            cookie_header: Some("other=1; pb_global_id=999".to_string()),
            ..context()
        };
        let event = recorded(collector.process(&request, &ctx, now()));

        assert_eq!(event.event.global_id, "999");
        assert!(event.set_cookie.is_none());
        assert!(event.event.cookies_enabled);
    }

    #[test]
    fn test_missing_ids_fall_back_to_server_time() {
        let (collector, sink) = collector();
        let request = EventRequest::parse_query("site=5&type=page&visit_id=111");
        let event = recorded(collector.process(&request, &context(), now()));

        assert_eq!(event.event.visit_id, "1448933400000000");
        assert_eq!(event.event.user_id, event.event.visit_id);
        assert!(!event.event.cookies_enabled);

        let record = LogRecord::parse(&sink.lines()[0]).unwrap();
        assert_eq!(record.get("co"), Some("no"));
    }

    #[test]
    fn test_record_length_follows_new_visit_flag() {
        let (collector, sink) = collector();
        let ids = "visit_id=1&user_id=2";

        collector.process(
            &EventRequest::parse_query(&format!("site=5&type=page&new_visit=true&{ids}")),
            &context(),
            now(),
        );
        collector.process(
            &EventRequest::parse_query(&format!("site=5&type=page&new_visit=false&{ids}")),
            &context(),
            now(),
        );

        let lines = sink.lines();
        let long = LogRecord::parse(&lines[0]).unwrap();
        let short = LogRecord::parse(&lines[1]).unwrap();
        assert_eq!(long.field_count(), CORE_KEYS.len() + ENVIRONMENT_KEYS.len());
        assert_eq!(short.field_count(), CORE_KEYS.len());
        assert_eq!(collector.transparency().stats().new_visits, 1);
    }

    #[test]
    fn test_environment_defaults_and_header_cleanup() {
        let (collector, _sink) = collector();
        let request = EventRequest::parse_query(
            "site=5&type=page&new_visit=true&visit_id=1&user_id=2&java=1.8.0_91",
        );
        let event = recorded(collector.process(&request, &context(), now()));
        let env = event.event.environment.unwrap();

        assert_eq!(env.flash_version, "no");
        assert_eq!(env.java_version, "1.8");
        assert_eq!(env.javascript, "yes");
        assert_eq!(env.user_agent, "Mozilla/5.0 (X11 Linux)");
        assert_eq!(env.language, "en-GB,en;q=0.8");
    }

    #[test]
    fn test_forwarded_for_is_appended() {
        let ctx = RequestContext {
            remote_addr: "10.0.0.2".to_string(),
            forwarded_for: Some("198.51.100.7".to_string()),
            ..Default::default()
        };
        assert_eq!(ctx.host_ip(), "10.0.0.2,198.51.100.7");
        assert_eq!(context().host_ip(), "203.0.113.9");
    }

    #[test]
    fn test_ack_carries_time_zone_and_raw_text() {
        let (collector, _sink) = collector();
        let request = EventRequest::parse_query(
            "site=5&type=page&visit_id=1&user_id=2&name=a%7Cb&desc=x%7Cy&clock_time=23%3A5%3A0",
        );
        // server clock is 01:30 UTC
        let event = recorded(collector.process(&request, &context(), now()));

        assert_eq!(event.ack.time_zone, Some(-2));
        assert_eq!(event.ack.clock_time, "23:05:00");
        assert_eq!(event.ack.event_name, "a|b");
        assert_eq!(event.ack.event_desc, "x|y");
    }

    #[test]
    fn test_ack_without_clock_has_no_time_zone() {
        let (collector, _sink) = collector();
        let request =
            EventRequest::parse_query("site=5&type=exit&visit_id=1&user_id=2&name=http%3A//a/");
        let afternoon = Utc.with_ymd_and_hms(2015, 12, 1, 15, 0, 0).unwrap();
        let event = recorded(collector.process(&request, &context(), afternoon));

        assert!(!event.ack.new_visit);
        assert_eq!(event.ack.clock_time, "");
        assert_eq!(event.ack.time_zone, None);

        let script = crate::collector::render_callback_script(&event.ack, "PageBeacon");
        assert!(script.contains("data.clockTime = '';"));
        assert!(script.contains("data.timeZone = '';"));
    }

    #[test]
    fn test_oversized_clock_hour_is_recorded() {
        let (collector, sink) = collector();
        let request = EventRequest::parse_query(
            "site=5&type=page&visit_id=1&user_id=2&new_visit=true&clock_time=2147483648%3A00%3A00",
        );
        let event = recorded(collector.process(&request, &context(), now()));

        // server clock is 01:30 UTC; the unusable hour counts as zero
        assert_eq!(event.ack.time_zone, Some(-1));
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_write_failure_does_not_abort() {
        let collector = Collector::new(&Config::default(), Arc::new(BrokenSink), create_shared_log());
        let request = EventRequest::parse_query("site=5&type=page&visit_id=1&user_id=2");

        let event = recorded(collector.process(&request, &context(), now()));
        assert!(!event.logged);

        // the next request is processed normally
        let event = recorded(collector.process(&request, &context(), now()));
        assert!(!event.logged);
        assert_eq!(collector.transparency().stats().log_write_failures, 2);
    }
}
