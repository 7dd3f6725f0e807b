//! Sensor-side settings.

use super::links::DEFAULT_DOWNLOAD_EXTENSIONS;
use crate::config::SensorBootstrap;
use crate::event::SiteRef;

/// Configuration for one sensor instance.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Site being measured; events are refused until set
    pub site: Option<SiteRef>,
    /// Collector base URL
    pub collector_url: String,
    /// Prefix of every cookie the sensor writes
    pub cookie_prefix: String,
    /// Link extensions reported as downloads
    pub download_extensions: Vec<String>,
}

impl ClientConfig {
    pub fn new(collector_url: impl Into<String>) -> Self {
        Self {
            site: None,
            collector_url: collector_url.into(),
            cookie_prefix: "pb_".to_string(),
            download_extensions: DEFAULT_DOWNLOAD_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }

    /// Set the site, and optionally a channel within it.
    pub fn with_site(mut self, site: impl Into<String>, channel: Option<String>) -> Self {
        self.site = SiteRef::parse(&site.into()).map(|s| SiteRef::new(s.site, channel));
        self
    }

    /// Settings as published by a collector's bootstrap endpoint.
    pub fn from_bootstrap(bootstrap: &SensorBootstrap) -> Self {
        let mut config = Self::new(bootstrap.collector.clone())
            .with_site(bootstrap.site.clone(), bootstrap.channel.clone());
        config.cookie_prefix = bootstrap.cookie_prefix.clone();
        config
    }

    /// Full URL for an encoded event query.
    pub fn event_url(&self, query: &str) -> String {
        format!(
            "{}/event.json?{}",
            self.collector_url.trim_end_matches('/'),
            query
        )
    }

    pub fn cookie_name(&self, name: &str) -> String {
        format!("{}{}", self.cookie_prefix, name)
    }
}
