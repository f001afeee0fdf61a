//! Display agent configuration
//!
//! Handles:
//! - TOML file in the OS config dir (`wardsign-display/config.toml`)
//! - Data source selection (registry or local CSV snapshots)
//! - Interval bounds for refresh and kiosk rotation

use crate::model::{ContentMode, DisplayConfig};
use crate::rotation::{screen_interval, DEFAULT_SECTION_INTERVAL};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const REFRESH_INTERVAL_MIN: Duration = Duration::from_secs(5);
pub const REFRESH_INTERVAL_MAX: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not find the OS config directory")]
    NoConfigDir,
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("cannot encode config: {0}")]
    Encode(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    Registry,
    Csv { data_dir: PathBuf },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayAgentConfig {
    pub display_id: String,
    pub registry_url: String,
    pub source: SourceConfig,
    /// Used when the source carries no registry settings (CSV mode)
    pub location: String,
    pub content: ContentMode,
    pub display_config: Option<DisplayConfig>,
    pub heartbeat_interval_secs: u64,
    pub refresh_interval_secs: u64,
    pub section_interval_secs: u64,
    pub screen_interval_secs: u64,
    /// Mixed displays rotate whole screens at `screen_interval_secs`
    pub kiosk: bool,
    pub request_timeout_ms: u64,
    pub beacon_timeout_ms: u64,
    pub simulate: bool,
    pub simulation_seed: Option<u64>,
}

impl Default for DisplayAgentConfig {
    fn default() -> Self {
        Self {
            display_id: "DISP-001".to_string(),
            registry_url: "http://127.0.0.1:8080".to_string(),
            source: SourceConfig::Registry,
            location: String::new(),
            content: ContentMode::Mixed,
            display_config: None,
            heartbeat_interval_secs: 15,
            refresh_interval_secs: 10,
            section_interval_secs: DEFAULT_SECTION_INTERVAL.as_secs(),
            screen_interval_secs: 30,
            kiosk: false,
            request_timeout_ms: 5_000,
            beacon_timeout_ms: 1_000,
            simulate: false,
            simulation_seed: None,
        }
    }
}

impl DisplayAgentConfig {
    /// Loads the given file, or the OS default; missing file => defaults.
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_file_path()?,
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(&path).await.map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io { path: path.display().to_string(), source };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(path, toml::to_string_pretty(self)?).await.map_err(io_err)?;
        Ok(())
    }

    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        path.push("wardsign-display");
        path.push("config.toml");
        Ok(path)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs).clamp(REFRESH_INTERVAL_MIN, REFRESH_INTERVAL_MAX)
    }

    /// Per-section rotation for Mixed displays, or whole-screen rotation in kiosk mode.
    pub fn rotation_interval(&self) -> Duration {
        if self.kiosk {
            screen_interval(Duration::from_secs(self.screen_interval_secs))
        } else {
            Duration::from_secs(self.section_interval_secs.max(1))
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn beacon_timeout(&self) -> Duration {
        Duration::from_millis(self.beacon_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DisplayAgentConfig::default();
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(15));
        assert_eq!(config.rotation_interval(), Duration::from_secs(15));
        assert_eq!(config.source, SourceConfig::Registry);
    }

    #[test]
    fn test_interval_bounds() {
        let mut config = DisplayAgentConfig { refresh_interval_secs: 1, ..Default::default() };
        assert_eq!(config.refresh_interval(), Duration::from_secs(5));
        config.refresh_interval_secs = 60;
        assert_eq!(config.refresh_interval(), Duration::from_secs(15));

        config.kiosk = true;
        config.screen_interval_secs = 500;
        assert_eq!(config.rotation_interval(), Duration::from_secs(120));
        config.screen_interval_secs = 2;
        assert_eq!(config.rotation_interval(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_toml_roundtrip_with_csv_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wardsign-display").join("config.toml");
        let config = DisplayAgentConfig {
            display_id: "DISP-007".into(),
            source: SourceConfig::Csv { data_dir: "/srv/wardsign/data".into() },
            content: ContentMode::DrugInventory,
            display_config: Some(DisplayConfig::DrugInventory { low_stock_only: true }),
            ..Default::default()
        };
        config.save(&path).await.unwrap();

        let loaded = DisplayAgentConfig::load(Some(&path)).await.unwrap();
        assert_eq!(loaded.display_id, "DISP-007");
        assert_eq!(loaded.source, config.source);
        assert_eq!(loaded.content, ContentMode::DrugInventory);
        assert_eq!(loaded.display_config, config.display_config);
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "display_id = \"DISP-042\"\nkiosk = true\n").unwrap();
        let loaded = DisplayAgentConfig::load(Some(&path)).await.unwrap();
        assert_eq!(loaded.display_id, "DISP-042");
        assert!(loaded.kiosk);
        assert_eq!(loaded.heartbeat_interval_secs, 15);
    }

    #[tokio::test]
    async fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "kiosk = \"sometimes\"\n").unwrap();
        let err = DisplayAgentConfig::load(Some(&path)).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_missing_file_is_default() {
        let loaded = DisplayAgentConfig::load(Some(Path::new("/nonexistent/config.toml"))).await.unwrap();
        assert_eq!(loaded.display_id, "DISP-001");
    }
}
