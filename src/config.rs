//! Configuration for the pagebeacon collector.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address to bind the HTTP listener to
    pub bind_address: String,

    /// Port to listen on (0 for random)
    pub port: u16,

    /// Public base URL of the collector, handed to sensors at bootstrap
    pub public_url: String,

    /// File the event log is appended to; events go to the tracing
    /// output when unset
    pub event_log_path: Option<PathBuf>,

    /// Prefix of every cookie name the sensor and collector write
    pub cookie_prefix: String,

    /// Explicit domain for the global id cookie; derived from the request
    /// host when unset
    pub cookie_domain: Option<String>,

    /// Global id value that marks an opted-out browser
    pub opt_out_value: String,

    /// Script namespace object the callback script populates
    pub namespace: String,

    /// Compact P3P policy sent with every event response
    pub p3p_policy: Option<String>,

    /// How long browsers may cache the bootstrap response
    #[serde(with = "duration_serde")]
    pub bootstrap_max_age: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
            public_url: "http://127.0.0.1:8080".to_string(),
            event_log_path: None,
            cookie_prefix: "pb_".to_string(),
            cookie_domain: None,
            opt_out_value: "optout".to_string(),
            namespace: "PageBeacon".to_string(),
            p3p_policy: None,
            bootstrap_max_age: Duration::from_secs(90 * 24 * 3600), // 90 days
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a file, falling back to defaults when it
    /// does not exist.
    pub fn load_from(config_path: &std::path::Path) -> Result<Self, ConfigError> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pagebeacon")
            .join("config.json")
    }

    /// Reject settings the collector cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.opt_out_value.is_empty() {
            return Err(ConfigError::Invalid(
                "opt_out_value must not be empty".to_string(),
            ));
        }
        let namespace_ok = self
            .namespace
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
            && self
                .namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
        if !namespace_ok {
            return Err(ConfigError::Invalid(format!(
                "namespace '{}' is not a script identifier",
                self.namespace
            )));
        }
        Ok(())
    }

    /// Name of the global id cookie.
    pub fn global_cookie_name(&self) -> String {
        format!("{}global_id", self.cookie_prefix)
    }
}

/// Site configuration the collector hands to a sensor at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorBootstrap {
    pub site: String,
    pub channel: Option<String>,
    /// Base URL events are sent to
    pub collector: String,
    pub namespace: String,
    pub cookie_prefix: String,
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.opt_out_value, "optout");
        assert_eq!(config.global_cookie_name(), "pb_global_id");
        assert_eq!(config.bootstrap_max_age, Duration::from_secs(7_776_000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"port": 9000, "bootstrap_max_age": 60}"#).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.bootstrap_max_age, Duration::from_secs(60));
        assert_eq!(config.namespace, "PageBeacon");
    }

    #[test]
    fn test_validate_rejects_bad_namespace() {
        let config = Config {
            namespace: "window.alert(1)".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("pagebeacon-no-such-config.json");
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.cookie_prefix, "pb_");
    }
}
