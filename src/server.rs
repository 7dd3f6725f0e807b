//! HTTP server for the event collector.
//!
//! This module provides an HTTP server that:
//! - Accepts events from script-tag sensors via GET /event and answers with a
//!   callback script
//! - Accepts events from HTTP sensors via GET /event.json and answers with a
//!   JSON acknowledgment
//! - Hands site configuration to sensors via GET /sensor?<site>[/<channel>]
//!
//! # Architecture
//!
//! ```text
//! Browser sensor ──→ GET /event ──→ Collector ──→ EventSink (event log)
//!       ↑                              │
//!       └──── callback script / ack ───┘
//! ```

use crate::collector::{
    render_callback_script, CollectOutcome, Collector, EventSink, FileSink, RequestContext,
    TracingSink,
};
use crate::config::{Config, SensorBootstrap};
use crate::event::{EventRequest, SiteRef};
use crate::transparency::{create_shared_log, TransparencyStats};
use axum::{
    extract::{ConnectInfo, RawQuery, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Collector settings
    pub config: Config,
    /// Where event log lines go
    pub sink: Arc<dyn EventSink>,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(config: Config, sink: Arc<dyn EventSink>) -> Self {
        Self { config, sink }
    }

    /// Create a server configuration with the sink named by the config:
    /// a file when `event_log_path` is set, tracing output otherwise.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let sink: Arc<dyn EventSink> = match &config.event_log_path {
            Some(path) => Arc::new(FileSink::open(path)?),
            None => Arc::new(TracingSink),
        };
        Ok(Self::new(config, sink))
    }
}

/// Shared server state
pub struct ServerState {
    collector: Collector,
    config: Config,
}

impl ServerState {
    /// Create new server state
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            collector: Collector::new(&config.config, config.sink.clone(), create_shared_log()),
            config: config.config.clone(),
        }
    }

    /// Headers every event response carries.
    fn event_headers(&self, content_type: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
        if let Some(policy) = &self.config.p3p_policy {
            match HeaderValue::from_str(&format!("CP=\"{policy}\"")) {
                Ok(value) => {
                    headers.insert(HeaderName::from_static("p3p"), value);
                }
                Err(e) => tracing::warn!("Ignoring unusable P3P policy: {}", e),
            }
        }
        headers
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /stats
async fn stats(State(state): State<Arc<ServerState>>) -> Json<TransparencyStats> {
    Json(state.collector.transparency().stats())
}

/// Gather the request metadata the collector reads.
fn request_context(addr: SocketAddr, headers: &HeaderMap) -> RequestContext {
    let get = |name: header::HeaderName| -> Option<String> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    };

    RequestContext {
        remote_addr: addr.ip().to_string(),
        forwarded_for: get(HeaderName::from_static("x-forwarded-for")),
        accept_language: get(header::ACCEPT_LANGUAGE),
        user_agent: get(header::USER_AGENT),
        cookie_header: get(header::COOKIE),
        host: get(header::HOST),
    }
}

/// Process one request off the async workers, since sinks write to disk.
///
/// `None` means the processing task died; the page sees the same empty
/// answer as for a rejected request.
async fn collect(
    state: &Arc<ServerState>,
    addr: SocketAddr,
    headers: &HeaderMap,
    query: Option<String>,
) -> Option<CollectOutcome> {
    let request = EventRequest::parse_query(query.as_deref().unwrap_or_default());
    let context = request_context(addr, headers);
    let state = state.clone();

    match tokio::task::spawn_blocking(move || {
        state.collector.process(&request, &context, Utc::now())
    })
    .await
    {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            tracing::error!("Event processing failed: {}", e);
            None
        }
    }
}

fn append_set_cookie(headers: &mut HeaderMap, cookie: Option<&str>) {
    if let Some(cookie) = cookie {
        match HeaderValue::from_str(cookie) {
            Ok(value) => {
                headers.append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::warn!("Could not set global id cookie: {}", e),
        }
    }
}

/// GET /event
///
/// Records the event and returns a script that mirrors it into the page.
/// Rejected requests get an empty script.
async fn event_script(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    let mut response_headers = state.event_headers("text/javascript");

    match collect(&state, addr, &headers, query).await {
        Some(CollectOutcome::Recorded(recorded)) => {
            append_set_cookie(&mut response_headers, recorded.set_cookie.as_deref());
            let body = render_callback_script(&recorded.ack, &state.config.namespace);
            (StatusCode::OK, response_headers, body).into_response()
        }
        Some(CollectOutcome::Rejected(_)) | None => {
            (StatusCode::OK, response_headers).into_response()
        }
    }
}

/// GET /event.json
///
/// Records the event and returns the acknowledgment as JSON. Rejected
/// requests get 204 with no body.
async fn event_json(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    match collect(&state, addr, &headers, query).await {
        Some(CollectOutcome::Recorded(recorded)) => {
            let mut response_headers = state.event_headers("application/json");
            append_set_cookie(&mut response_headers, recorded.set_cookie.as_deref());
            match serde_json::to_string(&recorded.ack) {
                Ok(body) => (StatusCode::OK, response_headers, body).into_response(),
                Err(e) => {
                    tracing::error!("Failed to serialize acknowledgment: {}", e);
                    (StatusCode::NO_CONTENT, response_headers).into_response()
                }
            }
        }
        Some(CollectOutcome::Rejected(_)) | None => {
            let mut response_headers = state.event_headers("application/json");
            response_headers.remove(header::CONTENT_TYPE);
            (StatusCode::NO_CONTENT, response_headers).into_response()
        }
    }
}

/// GET /sensor?<site>[/<channel>]
///
/// Site configuration for a sensor, cacheable for the configured period.
async fn bootstrap(State(state): State<Arc<ServerState>>, RawQuery(query): RawQuery) -> Response {
    let Some(site) = query.as_deref().and_then(SiteRef::parse) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Expected /sensor?<site>[/<channel>]".to_string(),
                code: "MISSING_SITE".to_string(),
            }),
        )
            .into_response();
    };

    let max_age = state.config.bootstrap_max_age;
    let expires = Utc::now()
        + chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::days(90));

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={}", max_age.as_secs())) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    if let Ok(value) =
        HeaderValue::from_str(&expires.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
    {
        headers.insert(header::EXPIRES, value);
    }

    let body = SensorBootstrap {
        site: site.site,
        channel: site.channel,
        collector: state.config.public_url.clone(),
        namespace: state.config.namespace.clone(),
        cookie_prefix: state.config.cookie_prefix.clone(),
    };

    (StatusCode::OK, headers, Json(body)).into_response()
}

/// Build the router over an existing state.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/event", get(event_script))
        .route("/event.json", get(event_json))
        .route("/sensor", get(bootstrap))
        .layer(
            CorsLayer::new()
                // the JSON endpoint relies on the collector's own cookies
                .allow_origin(AllowOrigin::mirror_request())
                .allow_credentials(true)
                .allow_methods([Method::GET]),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    config.config.validate()?;

    let addr: SocketAddr =
        format!("{}:{}", config.config.bind_address, config.config.port).parse()?;
    let state = Arc::new(ServerState::new(&config));
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Event collector listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
            tracing::info!("Server shutdown signal received");
        })
        .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
