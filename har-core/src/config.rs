//! Process-wide configuration.
//!
//! Loaded once at startup from TOML (default `~/.config/har/config.toml`)
//! and re-read only on explicit reload. Every field carries a serde default
//! so a missing or partial file still yields a working configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// HAR configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Path to the routing table YAML.
    #[serde(default = "default_table_path")]
    pub table_path: String,
    /// Install the passthrough fallback route when the table fails to load.
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            table_path: default_table_path(),
            fallback_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Interval between scheduled probes (humantime syntax, e.g. "30s").
    #[serde(default = "default_check_interval")]
    pub check_interval: String,
    /// Per-probe timeout (humantime syntax, e.g. "5s").
    #[serde(default = "default_check_timeout")]
    pub check_timeout: String,
    /// Treat backends as healthy when the checker is unreachable.
    #[serde(default = "default_true")]
    pub fail_open: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            check_timeout: default_check_timeout(),
            fail_open: true,
        }
    }
}

impl HealthConfig {
    /// Parsed probe interval; malformed values fall back to 30 s.
    pub fn interval(&self) -> Duration {
        parse_duration(&self.check_interval, Duration::from_secs(30))
    }

    /// Parsed probe timeout; malformed values fall back to 5 s.
    pub fn timeout(&self) -> Duration {
        parse_duration(&self.check_timeout, Duration::from_secs(5))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Pass all backends when the policy engine is unreachable.
    #[serde(default = "default_true")]
    pub fail_open: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self { fail_open: true }
    }
}

fn parse_duration(text: &str, fallback: Duration) -> Duration {
    match humantime::parse_duration(text) {
        Ok(duration) => duration,
        Err(err) => {
            warn!("invalid duration {text:?} in config, using {fallback:?}: {err}");
            fallback
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_table_path() -> String {
    "priv/routing_table.yaml".to_string()
}

fn default_check_interval() -> String {
    "30s".to_string()
}

fn default_check_timeout() -> String {
    "5s".to_string()
}

fn default_true() -> bool {
    true
}

impl HarConfig {
    /// Default config file location (`~/.config/har/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("har").join("config.toml"))
    }

    /// Load from an explicit path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load from `path` (or the default location), falling back to defaults
    /// with a warning instead of failing the process.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let candidate = path
            .map(Path::to_path_buf)
            .or_else(Self::default_path);
        let Some(candidate) = candidate else {
            return Self::default();
        };

        match Self::load(&candidate) {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) if path.is_none() => Self::default(),
            Err(err) => {
                warn!("falling back to default config: {err}");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HarConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.routing.table_path, "priv/routing_table.yaml");
        assert!(config.health.fail_open);
        assert_eq!(config.health.interval(), Duration::from_secs(30));
        assert_eq!(config.health.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: HarConfig = toml::from_str(
            r#"
            [health]
            check_interval = "2m"
            "#,
        )
        .unwrap();
        assert_eq!(config.health.interval(), Duration::from_secs(120));
        assert_eq!(config.health.timeout(), Duration::from_secs(5));
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_malformed_duration_falls_back() {
        let config: HarConfig = toml::from_str(
            r#"
            [health]
            check_timeout = "soon"
            "#,
        )
        .unwrap();
        assert_eq!(config.health.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_load_missing_file() {
        let err = HarConfig::load(Path::new("/nonexistent/har.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_or_default_with_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "general = 42").unwrap();
        let config = HarConfig::load_or_default(Some(&path));
        assert_eq!(config.general.log_level, "info");
    }
}
