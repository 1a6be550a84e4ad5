//! Collector connection settings

use std::time::Duration;

use serde::Deserialize;

/// Where the collector lives and how long to wait for it
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Whole-request timeout
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl CollectorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_timeout() -> u64 {
    5000
}

fn default_connect_timeout() -> u64 {
    2000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_table() {
        let config: CollectorConfig = toml::from_str("").unwrap();
        assert_eq!(config.base_url, "http://127.0.0.1:8080");
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.connect_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_partial_override() {
        let config: CollectorConfig =
            toml::from_str("base_url = \"https://collector.example.com\"\ntimeout_ms = 750")
                .unwrap();
        assert_eq!(config.base_url, "https://collector.example.com");
        assert_eq!(config.timeout_ms, 750);
        assert_eq!(config.connect_timeout_ms, 2000);
    }
}
