use anyhow::{Context, Result};
use common::types::{EventLevel, EventQuery, EventType};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::source::StreamSettings;

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    pub server: ServerConfig,
    pub lodestone: LodestoneConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LodestoneConfig {
    pub base_url: String,
    /// Overridden by `LODESTONE_TOKEN` when set.
    pub token: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    pub reconnect_delay_ms: u64,
    pub event_levels: Option<Vec<EventLevel>>,
    pub event_types: Option<Vec<EventType>>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 1000,
            event_levels: None,
            event_types: None,
        }
    }
}

impl StreamConfig {
    pub fn settings(&self) -> StreamSettings {
        StreamSettings {
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            filter: EventQuery {
                event_levels: self.event_levels.clone(),
                event_types: self.event_types.clone(),
                ..EventQuery::default()
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    pub prometheus_port: Option<u16>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            prometheus_port: None,
            log_level: default_log_level(),
        }
    }
}

impl NotifierConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {path}"))?;
        let mut config = Self::from_str(&content)?;
        if let Ok(token) = std::env::var("LODESTONE_TOKEN") {
            if !token.is_empty() {
                config.lodestone.token = Some(token);
            }
        }
        Ok(config)
    }

    pub fn from_str(content: &str) -> Result<Self> {
        let config: NotifierConfig =
            toml::from_str(content).context("failed to parse notifier config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.server.port > 0, "server.port must be > 0");
        anyhow::ensure!(
            self.lodestone.base_url.starts_with("http://")
                || self.lodestone.base_url.starts_with("https://"),
            "lodestone.base_url must start with http:// or https://"
        );
        anyhow::ensure!(
            self.lodestone.request_timeout_secs > 0,
            "lodestone.request_timeout_secs must be > 0"
        );
        anyhow::ensure!(
            self.stream.reconnect_delay_ms > 0,
            "stream.reconnect_delay_ms must be > 0"
        );
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.lodestone.request_timeout_secs)
    }

    pub fn default_config_path() -> String {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(std::path::Path::to_path_buf));

        if let Some(dir) = &exe_dir {
            let candidate = dir.join("notifier.toml");
            if candidate.exists() {
                return candidate.to_string_lossy().to_string();
            }
        }

        let candidate = Path::new("config/notifier.toml");
        if candidate.exists() {
            return candidate.to_string_lossy().to_string();
        }

        // Workspace root during development
        let candidate = Path::new("../../config/notifier.toml");
        if candidate.exists() {
            return candidate.to_string_lossy().to_string();
        }

        "config/notifier.toml".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_config() -> &'static str {
        r#"
[server]
port = 8090
host = "127.0.0.1"

[lodestone]
base_url = "http://127.0.0.1:16662/api/v1"
token = "file-token"
request_timeout_secs = 5

[stream]
reconnect_delay_ms = 1000
event_levels = ["Warning", "Error"]
event_types = ["InstanceEvent", "ProgressionEvent"]

[observability]
prometheus_port = 9096
log_level = "debug"
"#
    }

    #[test]
    fn test_parse_valid_config() {
        let config = NotifierConfig::from_str(sample_config()).unwrap();
        assert_eq!(config.server.port, 8090);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(config.server.api_key.is_none());
        assert_eq!(config.lodestone.token.as_deref(), Some("file-token"));
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.observability.prometheus_port, Some(9096));

        let settings = config.stream.settings();
        assert_eq!(settings.reconnect_delay, Duration::from_secs(1));
        assert_eq!(
            settings.filter.event_levels,
            Some(vec![EventLevel::Warning, EventLevel::Error])
        );
        assert_eq!(
            settings.filter.event_types,
            Some(vec![EventType::InstanceEvent, EventType::ProgressionEvent])
        );
        assert!(settings.filter.bearer_token.is_none());
    }

    #[test]
    fn test_optional_sections_default() {
        let minimal = r#"
[server]
port = 8090
host = "0.0.0.0"

[lodestone]
base_url = "https://core.example.com"
"#;
        let config = NotifierConfig::from_str(minimal).unwrap();
        assert_eq!(config.stream.reconnect_delay_ms, 1000);
        assert_eq!(config.lodestone.request_timeout_secs, 10);
        assert_eq!(config.observability.log_level, "info");
        assert!(config.observability.prometheus_port.is_none());
    }

    #[test]
    fn test_parse_invalid_config_missing_field() {
        let bad = "
[server]
port = 8090
";
        assert!(NotifierConfig::from_str(bad).is_err());
    }

    #[test]
    fn test_validate_base_url_scheme() {
        let content = sample_config().replace("http://127.0.0.1", "ftp://127.0.0.1");
        let err = NotifierConfig::from_str(&content).unwrap_err();
        assert!(err.to_string().contains("lodestone.base_url"));
    }

    #[test]
    fn test_validate_zero_reconnect_delay() {
        let content =
            sample_config().replace("reconnect_delay_ms = 1000", "reconnect_delay_ms = 0");
        let err = NotifierConfig::from_str(&content).unwrap_err();
        assert!(err.to_string().contains("reconnect_delay_ms must be > 0"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(sample_config().as_bytes()).unwrap();

        let config = NotifierConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.port, 8090);
    }

    #[test]
    fn test_load_missing_file() {
        let err = NotifierConfig::load("does/not/exist.toml").unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test]
    fn test_shipped_config_parses() {
        let content = include_str!("../../../config/notifier.toml");
        let config = NotifierConfig::from_str(content).unwrap();
        assert!(config.server.port > 0);
    }
}
