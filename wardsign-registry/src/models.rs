/**
 * MODÈLES REGISTRE - Types partagés entre catalogue, API et events
 *
 * RÔLE : Écrans enregistrés (DisplayEndpoint), heartbeats entrants, vues
 * exposées par l'API et events de changement de statut.
 *
 * FORMAT FIL : JSON camelCase (`displayId`, `staleForSeconds`...), dates RFC3339.
 */

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};

/// Statut d'un écran tel que vu par le registre
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStatus {
    Online,
    Offline,
    Warning,
}

/// Statut annoncé par un écran dans son heartbeat (jamais "warning")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PulseStatus {
    Online,
    Offline,
}

impl From<PulseStatus> for DisplayStatus {
    fn from(p: PulseStatus) -> Self {
        match p {
            PulseStatus::Online => DisplayStatus::Online,
            PulseStatus::Offline => DisplayStatus::Offline,
        }
    }
}

/// Mode de contenu d'un écran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    #[serde(rename = "Mixed Dashboard")]
    Mixed,
    #[serde(rename = "Token Queue")]
    TokenQueue,
    #[serde(rename = "OT Status")]
    OtStatus,
    #[serde(rename = "Emergency Alerts")]
    EmergencyAlerts,
    #[serde(rename = "Drug Inventory")]
    DrugInventory,
    #[serde(rename = "Department Status")]
    DepartmentStatus,
    #[serde(rename = "Health Education")]
    HealthEducation,
}

/// Identifiant des vues affichables (ordre de rotation fixé côté écran)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewId {
    Overview,
    Queue,
    Ot,
    Emergency,
    Inventory,
    Departments,
    Education,
}

/// Seuil de priorité d'alerte (minuscules sur le fil, comme côté écran)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPriority {
    Low,
    Medium,
    High,
    Critical,
}

/// Configuration spécifique au type de contenu (une variante par type)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DisplayConfig {
    Mixed {
        #[serde(default)]
        section_interval_secs: Option<u64>,
    },
    TokenQueue {
        #[serde(default)]
        counters: Vec<String>,
    },
    OtStatus {
        #[serde(default)]
        theatres: Vec<String>,
    },
    EmergencyAlerts {
        #[serde(default)]
        min_priority: Option<AlertPriority>,
    },
    DrugInventory {
        #[serde(default)]
        low_stock_only: bool,
    },
    DepartmentStatus {
        #[serde(default)]
        departments: Vec<String>,
    },
    HealthEducation {
        #[serde(default)]
        topics: Vec<String>,
    },
}

impl DisplayConfig {
    pub fn content_type(&self) -> ContentType {
        match self {
            DisplayConfig::Mixed { .. } => ContentType::Mixed,
            DisplayConfig::TokenQueue { .. } => ContentType::TokenQueue,
            DisplayConfig::OtStatus { .. } => ContentType::OtStatus,
            DisplayConfig::EmergencyAlerts { .. } => ContentType::EmergencyAlerts,
            DisplayConfig::DrugInventory { .. } => ContentType::DrugInventory,
            DisplayConfig::DepartmentStatus { .. } => ContentType::DepartmentStatus,
            DisplayConfig::HealthEducation { .. } => ContentType::HealthEducation,
        }
    }
}

/// Écran enregistré dans le catalogue (persisté en JSON)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayEndpoint {
    pub display_id: String,
    pub location: String,
    pub content: ContentType,
    #[serde(default)]
    pub config: Option<DisplayConfig>,
    pub status: DisplayStatus,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_heartbeat: Option<OffsetDateTime>,
    /// Horodatage annoncé par l'écran lui-même (horloge écran, indicatif)
    #[serde(default)]
    pub reported_at: Option<String>,
    #[serde(default)]
    pub pinned_view: Option<ViewId>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Corps de POST /api/displays (création ou mise à jour admin)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayRegistration {
    pub display_id: String,
    pub location: String,
    pub content: ContentType,
    #[serde(default)]
    pub config: Option<DisplayConfig>,
}

/// Corps de POST /api/displays/heartbeat
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatIn {
    pub display_id: String,
    pub status: PulseStatus,
    pub timestamp: String,
}

/// Corps de PUT /api/displays/{id}/pin
#[derive(Debug, Clone, Deserialize)]
pub struct PinRequest {
    pub view: ViewId,
}

/// Vue API d'un écran (avec âge du dernier heartbeat)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayView {
    pub display_id: String,
    pub location: String,
    pub content: ContentType,
    pub config: Option<DisplayConfig>,
    pub status: DisplayStatus,
    pub last_heartbeat: Option<String>,
    pub stale: bool,
    pub stale_for_seconds: Option<i64>,
    pub pinned_view: Option<ViewId>,
}

impl DisplayView {
    pub fn from_endpoint(d: &DisplayEndpoint, now: OffsetDateTime, stale_after: Duration) -> Self {
        let age = d.last_heartbeat.map(|t| now - t);
        DisplayView {
            display_id: d.display_id.clone(),
            location: d.location.clone(),
            content: d.content,
            config: d.config.clone(),
            status: d.status,
            last_heartbeat: d.last_heartbeat.and_then(|t| t.format(&Rfc3339).ok()),
            // jamais vu = stale
            stale: age.map(|a| a > stale_after).unwrap_or(true),
            stale_for_seconds: age.map(|a| a.whole_seconds().max(0)),
            pinned_view: d.pinned_view,
        }
    }
}

/// Event publié à chaque transition de statut
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub display_id: String,
    pub previous: DisplayStatus,
    pub current: DisplayStatus,
    pub reason: String,
    pub timestamp: String,
}

pub type DisplaysMap = HashMap<String, DisplayEndpoint>;
