//! Delivery of event requests to the collector.

use crate::collector::EventAck;

/// Called with the collector's acknowledgment once an event is recorded.
pub type AckHandler = Box<dyn FnOnce(EventAck) + Send>;

/// Fire-and-forget delivery of one event request.
///
/// `send` must not block the caller. There is no retry and no error report:
/// an event that fails to arrive is simply never acknowledged.
pub trait Transport: Send + Sync {
    fn send(&self, url: String, on_ack: AckHandler);
}

/// Sensor client errors.
#[derive(Debug)]
pub enum ClientError {
    /// No site id configured
    SiteNotConfigured,
    /// Network/HTTP error
    Network(String),
    /// Collector returned an error response
    Server { status: u16 },
    /// Response body could not be decoded
    Serialization(String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::SiteNotConfigured => write!(f, "Sensor site id not set"),
            ClientError::Network(msg) => write!(f, "Collector network error: {msg}"),
            ClientError::Server { status } => write!(f, "Collector returned status {status}"),
            ClientError::Serialization(msg) => write!(f, "Collector response error: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {}

/// HTTP transport against the collector's JSON endpoint.
///
/// Requests run on the current tokio runtime; the collector's own cookies
/// are kept between requests like a browser would.
#[cfg(feature = "client")]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

#[cfg(feature = "client")]
impl HttpTransport {
    /// Create a new HTTP transport.
    pub fn new() -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .cookie_store(true)
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    /// Request one event and read the acknowledgment.
    ///
    /// `Ok(None)` means the collector accepted the request but recorded
    /// nothing (missing site or opted-out browser).
    pub async fn fetch_ack(&self, url: &str) -> Result<Option<EventAck>, ClientError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ClientError::Server {
                status: status.as_u16(),
            });
        }

        let ack = response
            .json::<EventAck>()
            .await
            .map_err(|e| ClientError::Serialization(e.to_string()))?;
        Ok(Some(ack))
    }

    /// Fetch the site configuration a collector publishes for a site.
    pub async fn fetch_bootstrap(
        &self,
        collector_url: &str,
        site: &crate::event::SiteRef,
    ) -> Result<crate::config::SensorBootstrap, ClientError> {
        let url = format!("{}/sensor?{}", collector_url.trim_end_matches('/'), site);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Server {
                status: status.as_u16(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Serialization(e.to_string()))
    }
}

#[cfg(feature = "client")]
impl Transport for HttpTransport {
    fn send(&self, url: String, on_ack: AckHandler) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!("No async runtime; event dropped");
                return;
            }
        };

        let transport = self.clone();
        handle.spawn(async move {
            match transport.fetch_ack(&url).await {
                Ok(Some(ack)) => on_ack(ack),
                Ok(None) => tracing::debug!("Collector recorded nothing for {}", url),
                Err(e) => tracing::debug!("Event lost: {}", e),
            }
        });
    }
}
