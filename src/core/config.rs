use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub poller: PollerConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_url")]
    pub base_url: String,

    /// Unset means the transport default (no explicit timeout).
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_progress_ceiling")]
    pub progress_ceiling: f64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SessionConfig {
    /// Sessions live for the whole process unless this is set.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    17900
}
fn default_gateway_url() -> String {
    "https://api.apify.com/v2".to_string()
}
fn default_poll_interval_ms() -> u64 {
    2000
}
fn default_progress_ceiling() -> f64 {
    85.0
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_url(),
            request_timeout_secs: None,
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            progress_ceiling: default_progress_ceiling(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Root data directory: `ACTORDECK_DATA_DIR` or `~/.actordeck`.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("ACTORDECK_DATA_DIR")
        && !dir.is_empty()
    {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".actordeck")
}

/// Explicit path first, then `ACTORDECK_CONFIG`, then `<data dir>/config.toml`.
pub fn resolve_config_path(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }
    if let Ok(path) = std::env::var("ACTORDECK_CONFIG")
        && !path.is_empty()
    {
        return PathBuf::from(path);
    }
    data_dir().join("config.toml")
}

impl AppConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config found at {}, using defaults.", path.display());
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        if config.poller.interval_ms == 0 {
            anyhow::bail!("poller.interval_ms must be greater than zero");
        }
        Ok(config)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poller.interval_ms)
    }

    pub fn session_ttl(&self) -> Option<chrono::Duration> {
        self.session
            .ttl_secs
            .and_then(|secs| chrono::Duration::try_seconds(secs as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 17900);
        assert_eq!(config.gateway.base_url, "https://api.apify.com/v2");
        assert_eq!(config.gateway.request_timeout_secs, None);
        assert_eq!(config.poller.interval_ms, 2000);
        assert_eq!(config.session.ttl_secs, None);
        assert!(config.session_ttl().is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [server]
            port = 9000

            [session]
            ttl_secs = 3600
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.session_ttl(), Some(chrono::Duration::seconds(3600)));
        assert_eq!(config.poller.progress_ceiling, 85.0);
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let err = AppConfig::from_toml("[poller]\ninterval_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("interval_ms"));
    }

    #[tokio::test]
    async fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(dir.path().join("nope.toml")).await.unwrap();
        assert_eq!(config.server.port, 17900);
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        assert!(AppConfig::load(&path).await.is_err());
    }

    #[test]
    fn explicit_config_path_wins() {
        let path = resolve_config_path(Some("/tmp/custom.toml"));
        assert_eq!(path, PathBuf::from("/tmp/custom.toml"));
    }
}
