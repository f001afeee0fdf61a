use crate::models::{ContentType, DisplayConfig};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path};
use tokio::fs;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RegistryConfig {
    pub bind: String,
    /// dossier des CSV (token_queue.csv, departments.csv...)
    pub data_dir: String,
    /// fichier JSON de persistance du catalogue
    pub store_path: String,
    /// sans heartbeat depuis ce délai => warning, 2x => offline
    pub stale_after_secs: u64,
    pub monitor_interval_secs: u64,
    /// écrans connus au démarrage (ajoutés s'ils sont absents du store)
    pub displays: HashMap<String, SeedDisplay>,
    pub mqtt: Option<MqttConf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SeedDisplay {
    pub location: String,
    pub content: ContentType,
    #[serde(default)]
    pub config: Option<DisplayConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".into(),
            data_dir: "./data".into(),
            store_path: "./data/displays.json".into(),
            stale_after_secs: 45,
            monitor_interval_secs: 15,
            displays: HashMap::new(),
            mqtt: None,
        }
    }
}

pub async fn load_config() -> RegistryConfig {
    let path = std::env::var("WARDSIGN_REGISTRY_CONFIG").unwrap_or_else(|_| "registry.yaml".into());
    load_config_from(&path).await
}

pub async fn load_config_from(path: &str) -> RegistryConfig {
    if Path::new(path).exists() {
        let txt = fs::read_to_string(path).await.unwrap_or_default();
        if txt.trim().is_empty() {
            return RegistryConfig::default();
        }
        serde_yaml::from_str(&txt).unwrap_or_else(|e| {
            warn!("[registry] config invalide ({path}): {e}");
            RegistryConfig::default()
        })
    } else {
        warn!("[registry] pas de {path}, usage config par défaut");
        RegistryConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let cfg = load_config_from("/nonexistent/registry.yaml").await;
        assert_eq!(cfg.stale_after_secs, 45);
        assert!(cfg.mqtt.is_none());
    }

    #[tokio::test]
    async fn test_yaml_with_seed_displays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.yaml");
        std::fs::write(
            &path,
            r#"
bind: "127.0.0.1:9000"
stale_after_secs: 30
displays:
  DISP-001:
    location: "Main Lobby"
    content: "Mixed Dashboard"
    config:
      type: mixed
      section_interval_secs: 20
  DISP-002:
    location: "OPD Block"
    content: "Token Queue"
mqtt:
  host: broker.local
  port: 1883
"#,
        )
        .unwrap();

        let cfg = load_config_from(path.to_str().unwrap()).await;
        assert_eq!(cfg.bind, "127.0.0.1:9000");
        assert_eq!(cfg.stale_after_secs, 30);
        // champs absents => défauts
        assert_eq!(cfg.monitor_interval_secs, 15);
        assert_eq!(cfg.displays.len(), 2);
        assert_eq!(cfg.displays["DISP-002"].content, ContentType::TokenQueue);
        assert_eq!(
            cfg.displays["DISP-001"].config,
            Some(DisplayConfig::Mixed { section_interval_secs: Some(20) })
        );
        assert_eq!(cfg.mqtt.unwrap().host, "broker.local");
    }

    #[tokio::test]
    async fn test_invalid_yaml_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.yaml");
        std::fs::write(&path, "stale_after_secs: [not, a, number]").unwrap();
        let cfg = load_config_from(path.to_str().unwrap()).await;
        assert_eq!(cfg.stale_after_secs, 45);
    }
}
