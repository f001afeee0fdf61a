//! Hospital data fetch layer
//!
//! A refresh fetches every sub-resource concurrently. A failing
//! sub-resource comes back empty and is listed in the outcome; the refresh
//! itself never fails. Only when every sub-resource fails is the previous
//! snapshot kept on screen.
//!
//! Sources:
//! - `RegistrySource`: `GET {registry}/api/data/{resource}` + display settings
//! - `CsvSource`: `{data_dir}/{resource}.csv`, header row, empty lines skipped

use crate::model::{DisplaySettings, HospitalSnapshot};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
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
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{resource} returned HTTP {status}")]
    Status { resource: &'static str, status: u16 },
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Provider of raw sub-resource rows
pub trait DataSource: Send + Sync + 'static {
    fn fetch(&self, resource: Resource) -> impl Future<Output = Result<Vec<Value>, FetchError>> + Send;

    /// Registry-side settings for this display, if the source has any.
    fn settings(&self) -> impl Future<Output = Result<Option<DisplaySettings>, FetchError>> + Send;
}

#[derive(Clone)]
pub struct RegistrySource {
    client: reqwest::Client,
    base_url: String,
    display_id: String,
}

impl RegistrySource {
    pub fn new(client: reqwest::Client, registry_url: &str, display_id: &str) -> Self {
        Self {
            client,
            base_url: registry_url.trim_end_matches('/').to_string(),
            display_id: display_id.to_string(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, resource: &'static str) -> Result<T, FetchError> {
        let response = self.client.get(format!("{}{}", self.base_url, path)).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status { resource, status: response.status().as_u16() });
        }
        Ok(response.json().await?)
    }
}

impl DataSource for RegistrySource {
    async fn fetch(&self, resource: Resource) -> Result<Vec<Value>, FetchError> {
        self.get_json(&format!("/api/data/{}", resource.slug()), resource.slug()).await
    }

    async fn settings(&self) -> Result<Option<DisplaySettings>, FetchError> {
        let settings = self.get_json(&format!("/api/displays/{}", self.display_id), "display").await?;
        Ok(Some(settings))
    }
}

#[derive(Clone)]
pub struct CsvSource {
    data_dir: PathBuf,
}

impl CsvSource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }
}

impl DataSource for CsvSource {
    async fn fetch(&self, resource: Resource) -> Result<Vec<Value>, FetchError> {
        let path = self.data_dir.join(format!("{}.csv", resource.slug()));
        let bytes = tokio::fs::read(&path).await.map_err(|source| FetchError::Io {
            path: path.display().to_string(),
            source,
        })?;
        parse_csv(&bytes)
    }

    async fn settings(&self) -> Result<Option<DisplaySettings>, FetchError> {
        Ok(None)
    }
}

/// Runtime choice between the two sources
#[derive(Clone)]
pub enum AnySource {
    Registry(RegistrySource),
    Csv(CsvSource),
}

impl DataSource for AnySource {
    async fn fetch(&self, resource: Resource) -> Result<Vec<Value>, FetchError> {
        match self {
            AnySource::Registry(s) => s.fetch(resource).await,
            AnySource::Csv(s) => s.fetch(resource).await,
        }
    }

    async fn settings(&self) -> Result<Option<DisplaySettings>, FetchError> {
        match self {
            AnySource::Registry(s) => s.settings().await,
            AnySource::Csv(s) => s.settings().await,
        }
    }
}

/// Header row, empty lines skipped, every value kept as a string.
pub fn parse_csv(bytes: &[u8]) -> Result<Vec<Value>, FetchError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let row: Map<String, Value> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.to_string(), Value::String(record.get(i).unwrap_or_default().to_string())))
            .collect();
        rows.push(Value::Object(row));
    }
    Ok(rows)
}

#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub snapshot: HospitalSnapshot,
    pub failed: Vec<Resource>,
    pub settings: Option<DisplaySettings>,
}

impl RefreshOutcome {
    pub fn is_total_failure(&self) -> bool {
        self.failed.len() == Resource::ALL.len()
    }
}

pub struct SnapshotFetcher<D> {
    source: D,
}

impl<D: DataSource> SnapshotFetcher<D> {
    pub fn new(source: D) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &D {
        &self.source
    }

    pub async fn refresh(&self) -> RefreshOutcome {
        let (queue, departments, alerts, inventory, blood, ot, settings) = tokio::join!(
            self.source.fetch(Resource::TokenQueue),
            self.source.fetch(Resource::Departments),
            self.source.fetch(Resource::EmergencyAlerts),
            self.source.fetch(Resource::DrugInventory),
            self.source.fetch(Resource::BloodBank),
            self.source.fetch(Resource::OtStatus),
            self.source.settings(),
        );

        let mut failed = Vec::new();
        let snapshot = HospitalSnapshot {
            token_queue: decode(Resource::TokenQueue, queue, &mut failed),
            departments: decode(Resource::Departments, departments, &mut failed),
            emergency_alerts: decode(Resource::EmergencyAlerts, alerts, &mut failed),
            drug_inventory: decode(Resource::DrugInventory, inventory, &mut failed),
            blood_bank: decode(Resource::BloodBank, blood, &mut failed),
            ot_status: decode(Resource::OtStatus, ot, &mut failed),
            fetched_at: Some(Utc::now()),
        };

        let settings = settings.unwrap_or_else(|e| {
            warn!("Display settings unavailable: {}", e);
            None
        });

        RefreshOutcome { snapshot, failed, settings }
    }
}

fn decode<T: DeserializeOwned>(
    resource: Resource,
    fetched: Result<Vec<Value>, FetchError>,
    failed: &mut Vec<Resource>,
) -> Vec<T> {
    let rows = match fetched {
        Ok(rows) => rows,
        Err(e) => {
            warn!("Refresh of {} failed, showing empty: {}", resource.slug(), e);
            failed.push(resource);
            return Vec::new();
        }
    };
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(item) => Some(item),
            Err(e) => {
                debug!("Skipping malformed {} row: {}", resource.slug(), e);
                None
            }
        })
        .collect()
}

/// Latest snapshot, swapped as a whole
#[derive(Clone)]
pub struct SnapshotStore {
    tx: Arc<watch::Sender<Arc<HospitalSnapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(HospitalSnapshot::default()));
        Self { tx: Arc::new(tx) }
    }

    pub fn latest(&self) -> Arc<HospitalSnapshot> {
        self.tx.borrow().clone()
    }

    pub fn replace(&self, snapshot: HospitalSnapshot) {
        self.tx.send_replace(Arc::new(snapshot));
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<HospitalSnapshot>> {
        self.tx.subscribe()
    }

    /// Stores a refresh result unless every sub-resource failed.
    pub fn apply(&self, outcome: &RefreshOutcome) -> bool {
        if outcome.is_total_failure() {
            warn!("Every data source failed, keeping previous snapshot");
            return false;
        }
        self.replace(outcome.snapshot.clone());
        true
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
