/**
 * HOSPITAL DATA - Accès lecture seule aux snapshots CSV de l'hôpital
 *
 * RÔLE : Sert les sous-ressources (file d'attente, services, alertes, stock
 * médicaments, banque de sang, blocs opératoires) depuis le dossier data/.
 *
 * FONCTIONNEMENT :
 * - Une ligne d'en-tête, lignes vides ignorées, valeurs laissées en chaînes
 *   (la coercition numérique est faite côté écran)
 * - Le payload agrégé d'un écran charge toutes les ressources en parallèle;
 *   une ressource en erreur devient une liste vide
 */

use crate::models::{ContentType, DisplayConfig, DisplayEndpoint, ViewId};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::warn;

pub type Record = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("unknown resource: {0}")]
    UnknownResource(String),
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    TokenQueue,
    Departments,
    EmergencyAlerts,
    DrugInventory,
    BloodBank,
    OtStatus,
}

impl Resource {
    pub const ALL: [Resource; 6] = [
        Resource::TokenQueue,
        Resource::Departments,
        Resource::EmergencyAlerts,
        Resource::DrugInventory,
        Resource::BloodBank,
        Resource::OtStatus,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            Resource::TokenQueue => "token_queue",
            Resource::Departments => "departments",
            Resource::EmergencyAlerts => "emergency_alerts",
            Resource::DrugInventory => "drug_inventory",
            Resource::BloodBank => "blood_bank",
            Resource::OtStatus => "ot_status",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.csv", self.slug())
    }

    pub fn parse(slug: &str) -> Result<Self, DataError> {
        Resource::ALL
            .into_iter()
            .find(|r| r.slug() == slug)
            .ok_or_else(|| DataError::UnknownResource(slug.to_string()))
    }
}

/// Payload de GET /api/displays/{id}/data
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayData {
    pub display_id: String,
    pub content_type: ContentType,
    pub config: Option<DisplayConfig>,
    pub pinned_view: Option<ViewId>,
    pub token_queue: Vec<Record>,
    pub departments: Vec<Record>,
    pub emergency_alerts: Vec<Record>,
    pub drug_inventory: Vec<Record>,
    pub blood_bank: Vec<Record>,
    pub ot_status: Vec<Record>,
}

#[derive(Debug, Clone)]
pub struct HospitalData {
    data_dir: PathBuf,
}

impl HospitalData {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    pub async fn read(&self, resource: Resource) -> Result<Vec<Record>, DataError> {
        let path = self.data_dir.join(resource.file_name());
        let bytes = tokio::fs::read(&path).await.map_err(|source| DataError::Io {
            path: path.display().to_string(),
            source,
        })?;
        parse_csv(&bytes)
    }

    async fn read_or_empty(&self, resource: Resource) -> Vec<Record> {
        self.read(resource).await.unwrap_or_else(|e| {
            warn!("[data] {} unavailable: {e}", resource.slug());
            Vec::new()
        })
    }

    pub async fn display_payload(&self, display: &DisplayEndpoint) -> DisplayData {
        let (token_queue, departments, emergency_alerts, drug_inventory, blood_bank, ot_status) = tokio::join!(
            self.read_or_empty(Resource::TokenQueue),
            self.read_or_empty(Resource::Departments),
            self.read_or_empty(Resource::EmergencyAlerts),
            self.read_or_empty(Resource::DrugInventory),
            self.read_or_empty(Resource::BloodBank),
            self.read_or_empty(Resource::OtStatus),
        );

        DisplayData {
            display_id: display.display_id.clone(),
            content_type: display.content,
            config: display.config.clone(),
            pinned_view: display.pinned_view,
            token_queue,
            departments,
            emergency_alerts,
            drug_inventory,
            blood_bank,
            ot_status,
        }
    }
}

/// Parse un CSV avec en-tête en objets JSON de chaînes
pub fn parse_csv(bytes: &[u8]) -> Result<Vec<Record>, DataError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader.headers()?.clone();
    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        if row.iter().all(|f| f.is_empty()) {
            continue;
        }
        let mut record = Map::new();
        for (i, header) in headers.iter().enumerate() {
            let value = row.get(i).unwrap_or_default();
            record.insert(header.to_string(), Value::String(value.to_string()));
        }
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DisplayStatus;

    #[test]
    fn test_parse_skips_empty_lines_and_pads_short_rows() {
        let csv = "token_number,patient_name,estimated_wait\nT-001,Asha,12\n\n,,\nT-002,Ravi\n";
        let rows = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["estimated_wait"], "12");
        assert_eq!(rows[1]["estimated_wait"], "");
    }

    #[test]
    fn test_resource_slugs() {
        assert_eq!(Resource::parse("blood_bank").unwrap(), Resource::BloodBank);
        assert!(matches!(Resource::parse("patients"), Err(DataError::UnknownResource(_))));
        assert_eq!(Resource::OtStatus.file_name(), "ot_status.csv");
    }

    #[tokio::test]
    async fn test_payload_degrades_missing_resources() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("token_queue.csv"),
            "token_number,department,estimated_wait\nT-001,Cardiology,15\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("emergency_alerts.csv"),
            "id,code_type,location,message,priority,status\nA1,Code Blue,Ward 3,Cardiac arrest,critical,active\n",
        )
        .unwrap();

        let data = HospitalData::new(dir.path());
        let display = DisplayEndpoint {
            display_id: "DISP-001".into(),
            location: "Lobby".into(),
            content: ContentType::Mixed,
            config: None,
            status: DisplayStatus::Online,
            last_heartbeat: None,
            reported_at: None,
            pinned_view: Some(ViewId::Queue),
            created_at: time::OffsetDateTime::now_utc(),
        };
        let payload = data.display_payload(&display).await;
        assert_eq!(payload.token_queue.len(), 1);
        assert_eq!(payload.emergency_alerts[0]["code_type"], "Code Blue");
        assert!(payload.departments.is_empty());
        assert!(payload.ot_status.is_empty());
        assert_eq!(payload.pinned_view, Some(ViewId::Queue));
    }
}
