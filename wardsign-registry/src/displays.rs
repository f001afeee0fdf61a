/**
 * DISPLAYS REGISTRY - Catalogue des écrans de signalétique et de leur liveness
 *
 * RÔLE : Enregistrement, persistance, heartbeats et détection des écrans muets.
 * Chaque transition de statut est poussée sur le canal d'events (→ MQTT).
 *
 * ARCHITECTURE : Map en RwLock + persistance JSON + tâche de monitoring périodique.
 * UTILITÉ : Savoir depuis un point central quels écrans affichent réellement.
 */

use crate::config::SeedDisplay;
use crate::models::{
    DisplayEndpoint, DisplayRegistration, DisplayStatus, DisplaysMap, HeartbeatIn, StatusEvent, ViewId,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown display: {0}")]
    UnknownDisplay(String),
    #[error("config type does not match content {0:?}")]
    ConfigMismatch(crate::models::ContentType),
    #[error("display id must not be empty")]
    EmptyId,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub struct DisplayRegistry {
    displays: Arc<RwLock<DisplaysMap>>,
    data_file: PathBuf,
    events: Option<mpsc::UnboundedSender<StatusEvent>>,
}

pub type SharedDisplayRegistry = Arc<DisplayRegistry>;

impl DisplayRegistry {
    pub fn new(data_file: impl Into<PathBuf>) -> Self {
        Self {
            displays: Arc::new(RwLock::new(HashMap::new())),
            data_file: data_file.into(),
            events: None,
        }
    }

    pub fn with_events(mut self, tx: mpsc::UnboundedSender<StatusEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Charge le catalogue depuis le fichier JSON de persistance
    pub async fn load_displays(&self) -> Result<(), RegistryError> {
        if !self.data_file.exists() {
            info!("[displays] no existing store at {}, starting fresh", self.data_file.display());
            return Ok(());
        }

        let content = tokio::fs::read_to_string(&self.data_file).await?;
        let displays: DisplaysMap = serde_json::from_str(&content)?;

        let mut map = self.displays.write().await;
        *map = displays;
        info!("[displays] loaded {} displays from {}", map.len(), self.data_file.display());
        Ok(())
    }

    pub async fn save_displays(&self) -> Result<(), RegistryError> {
        let content = {
            let map = self.displays.read().await;
            serde_json::to_string_pretty(&*map)?
        };
        if let Some(parent) = self.data_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.data_file, content).await?;
        Ok(())
    }

    /// Ajoute les écrans de la config absents du store (le store gagne)
    pub async fn seed(&self, seeds: &HashMap<String, SeedDisplay>) -> usize {
        let now = OffsetDateTime::now_utc();
        let mut added = 0;
        let mut map = self.displays.write().await;
        for (id, seed) in seeds {
            if map.contains_key(id) {
                continue;
            }
            if let Some(cfg) = &seed.config {
                if cfg.content_type() != seed.content {
                    warn!("[displays] seed {id}: config ignored, does not match {:?}", seed.content);
                }
            }
            map.insert(
                id.clone(),
                DisplayEndpoint {
                    display_id: id.clone(),
                    location: seed.location.clone(),
                    content: seed.content,
                    config: seed.config.clone().filter(|c| c.content_type() == seed.content),
                    status: DisplayStatus::Offline,
                    last_heartbeat: None,
                    reported_at: None,
                    pinned_view: None,
                    created_at: now,
                },
            );
            added += 1;
        }
        added
    }

    /// Création ou mise à jour admin (statut et heartbeat conservés)
    pub async fn upsert(&self, reg: DisplayRegistration) -> Result<DisplayEndpoint, RegistryError> {
        if reg.display_id.trim().is_empty() {
            return Err(RegistryError::EmptyId);
        }
        if let Some(cfg) = &reg.config {
            if cfg.content_type() != reg.content {
                return Err(RegistryError::ConfigMismatch(reg.content));
            }
        }

        let endpoint = {
            let mut map = self.displays.write().await;
            let entry = map.entry(reg.display_id.clone()).or_insert_with(|| DisplayEndpoint {
                display_id: reg.display_id.clone(),
                location: String::new(),
                content: reg.content,
                config: None,
                status: DisplayStatus::Offline,
                last_heartbeat: None,
                reported_at: None,
                pinned_view: None,
                created_at: OffsetDateTime::now_utc(),
            });
            entry.location = reg.location;
            entry.content = reg.content;
            entry.config = reg.config;
            entry.clone()
        };

        if let Err(e) = self.save_displays().await {
            warn!("[displays] failed to save after upsert: {e}");
        }
        info!("[displays] registered {} ({})", endpoint.display_id, endpoint.location);
        Ok(endpoint)
    }

    /// Suppression explicite (seule voie de disparition d'un écran)
    pub async fn remove(&self, display_id: &str) -> Result<(), RegistryError> {
        let removed = self.displays.write().await.remove(display_id);
        if removed.is_none() {
            return Err(RegistryError::UnknownDisplay(display_id.to_string()));
        }
        if let Err(e) = self.save_displays().await {
            warn!("[displays] failed to save after delete: {e}");
        }
        info!("[displays] deleted {display_id}");
        Ok(())
    }

    /// Traite un heartbeat; retourne le nouveau statut
    pub async fn handle_heartbeat(&self, hb: HeartbeatIn, now: OffsetDateTime) -> Result<DisplayStatus, RegistryError> {
        let status: DisplayStatus = hb.status.into();
        let previous = {
            let mut map = self.displays.write().await;
            let Some(display) = map.get_mut(&hb.display_id) else {
                debug!("[displays] heartbeat from unknown display {}", hb.display_id);
                return Err(RegistryError::UnknownDisplay(hb.display_id));
            };
            let previous = display.status;
            display.status = status;
            display.last_heartbeat = Some(now);
            display.reported_at = Some(hb.timestamp);
            previous
        };

        if previous != status {
            self.emit(&hb.display_id, previous, status, "heartbeat", now);
        }
        // pas de sauvegarde à chaque pulse, le monitor s'en charge
        Ok(status)
    }

    pub async fn list(&self) -> Vec<DisplayEndpoint> {
        let mut list: Vec<_> = self.displays.read().await.values().cloned().collect();
        list.sort_by(|a, b| a.display_id.cmp(&b.display_id));
        list
    }

    pub async fn get(&self, display_id: &str) -> Option<DisplayEndpoint> {
        self.displays.read().await.get(display_id).cloned()
    }

    pub async fn count_by_status(&self, status: DisplayStatus) -> usize {
        self.displays.read().await.values().filter(|d| d.status == status).count()
    }

    pub async fn len(&self) -> usize {
        self.displays.read().await.len()
    }

    /// Épingle une vue (pause de la rotation côté écran); None = reprise
    pub async fn set_pinned_view(&self, display_id: &str, view: Option<ViewId>) -> Result<(), RegistryError> {
        {
            let mut map = self.displays.write().await;
            let display = map
                .get_mut(display_id)
                .ok_or_else(|| RegistryError::UnknownDisplay(display_id.to_string()))?;
            display.pinned_view = view;
        }
        if let Err(e) = self.save_displays().await {
            warn!("[displays] failed to save after pin change: {e}");
        }
        match view {
            Some(v) => info!("[displays] {display_id} pinned to {v:?}"),
            None => info!("[displays] {display_id} rotation resumed"),
        }
        Ok(())
    }

    /// Dégrade les écrans muets: online -> warning après `stale_after`,
    /// online/warning -> offline après 2x. Retourne les transitions.
    pub async fn sweep_stale(&self, now: OffsetDateTime, stale_after: Duration) -> Vec<(String, DisplayStatus)> {
        let mut transitions = Vec::new();
        {
            let mut map = self.displays.write().await;
            for (id, display) in map.iter_mut() {
                let Some(last) = display.last_heartbeat else { continue };
                let age = now - last;
                let next = match display.status {
                    DisplayStatus::Online | DisplayStatus::Warning if age > stale_after * 2 => DisplayStatus::Offline,
                    DisplayStatus::Online if age > stale_after => DisplayStatus::Warning,
                    current => current,
                };
                if next != display.status {
                    transitions.push((id.clone(), display.status, next));
                    display.status = next;
                }
            }
        }

        for (id, previous, current) in &transitions {
            info!("[displays] {id} {previous:?} -> {current:?} (no heartbeat)");
            self.emit(id, *previous, *current, "stale", now);
        }
        transitions.into_iter().map(|(id, _, current)| (id, current)).collect()
    }

    fn emit(&self, display_id: &str, previous: DisplayStatus, current: DisplayStatus, reason: &str, now: OffsetDateTime) {
        let Some(tx) = &self.events else { return };
        let event = StatusEvent {
            display_id: display_id.to_string(),
            previous,
            current,
            reason: reason.to_string(),
            timestamp: now.format(&Rfc3339).unwrap_or_default(),
        };
        if tx.send(event).is_err() {
            debug!("[displays] status event dropped, publisher gone");
        }
    }

    /// Surveille périodiquement les écrans et sauvegarde le catalogue
    pub fn start_monitoring(registry: SharedDisplayRegistry, every: std::time::Duration, stale_after: Duration) {
        info!("[displays] starting monitor (every {:?}, stale after {}s)", every, stale_after.whole_seconds());

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let changed = registry.sweep_stale(OffsetDateTime::now_utc(), stale_after).await;
                if changed.is_empty() {
                    continue;
                }
                if let Err(e) = registry.save_displays().await {
                    warn!("[displays] failed to save during monitoring: {e}");
                }
            }
        });
    }
}
