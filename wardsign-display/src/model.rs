//! Display-side data model
//!
//! - Content modes and the fixed view identifiers
//! - Per-content-type display configuration (tagged union)
//! - Hospital snapshot records, decoded leniently from CSV/JSON rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// What a display is assigned to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentMode {
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

impl ContentMode {
    /// The single view a non-rotating display freezes on
    pub fn fixed_view(self) -> Option<ViewId> {
        match self {
            ContentMode::Mixed => None,
            ContentMode::TokenQueue => Some(ViewId::Queue),
            ContentMode::OtStatus => Some(ViewId::Ot),
            ContentMode::EmergencyAlerts => Some(ViewId::Emergency),
            ContentMode::DrugInventory => Some(ViewId::Inventory),
            ContentMode::DepartmentStatus => Some(ViewId::Departments),
            ContentMode::HealthEducation => Some(ViewId::Education),
        }
    }
}

impl Default for ContentMode {
    fn default() -> Self {
        ContentMode::Mixed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
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

impl ViewId {
    pub fn title(self) -> &'static str {
        match self {
            ViewId::Overview => "Hospital Overview",
            ViewId::Queue => "Token Queue",
            ViewId::Ot => "Operation Theatres",
            ViewId::Emergency => "Emergency Alerts",
            ViewId::Inventory => "Drug Inventory",
            ViewId::Departments => "Departments",
            ViewId::Education => "Health Education",
        }
    }

    fn slug(self) -> &'static str {
        match self {
            ViewId::Overview => "overview",
            ViewId::Queue => "queue",
            ViewId::Ot => "ot",
            ViewId::Emergency => "emergency",
            ViewId::Inventory => "inventory",
            ViewId::Departments => "departments",
            ViewId::Education => "education",
        }
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for ViewId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        crate::rotation::VIEW_ORDER
            .into_iter()
            .find(|v| v.slug() == wanted)
            .ok_or_else(|| format!("unknown view '{s}'"))
    }
}

/// Per-content-type settings delivered with the display's registration
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
        #[serde(default, deserialize_with = "lenient_min_priority")]
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

/// Display settings as held by the registry
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySettings {
    #[serde(default)]
    pub location: String,
    pub content: ContentMode,
    #[serde(default)]
    pub config: Option<DisplayConfig>,
    #[serde(default)]
    pub pinned_view: Option<ViewId>,
}

// ---------------------------------------------------------------------------
// Lenient field decoding

/// Coerces a raw field to a number: numbers pass through, numeric strings
/// are parsed, anything else is 0.
pub fn coerce_number(raw: &Value) -> f64 {
    let n = match raw {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

pub fn coerce_count(raw: &Value) -> u32 {
    coerce_number(raw).max(0.0).min(u32::MAX as f64) as u32
}

fn lenient_count<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    Ok(coerce_count(&Value::deserialize(d)?))
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn lenient_priority<'de, D: Deserializer<'de>>(d: D) -> Result<AlertPriority, D::Error> {
    let raw = lenient_string(d)?;
    Ok(AlertPriority::parse(&raw))
}

/// Any casing is accepted; blank or null means no threshold.
fn lenient_min_priority<'de, D: Deserializer<'de>>(d: D) -> Result<Option<AlertPriority>, D::Error> {
    let raw = lenient_string(d)?;
    Ok((!raw.is_empty()).then(|| AlertPriority::parse(&raw)))
}

// ---------------------------------------------------------------------------
// Snapshot records

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenEntry {
    #[serde(default, alias = "tokenNumber", deserialize_with = "lenient_string")]
    pub token_number: String,
    #[serde(default, alias = "patientName", deserialize_with = "lenient_string")]
    pub patient_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub department: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub counter: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: String,
    #[serde(default, alias = "estimatedWait", deserialize_with = "lenient_count")]
    pub estimated_wait: u32,
}

impl TokenEntry {
    pub fn is_waiting(&self) -> bool {
        self.status.eq_ignore_ascii_case("waiting")
    }

    pub fn is_serving(&self) -> bool {
        self.status.eq_ignore_ascii_case("serving")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Department {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, alias = "totalBeds", deserialize_with = "lenient_count")]
    pub total_beds: u32,
    #[serde(default, alias = "occupiedBeds", deserialize_with = "lenient_count")]
    pub occupied_beds: u32,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: String,
}

impl Department {
    pub fn occupancy_percent(&self) -> u32 {
        if self.total_beds == 0 {
            return 0;
        }
        let occupied = u64::from(self.occupied_beds.min(self.total_beds));
        (occupied * 100 / u64::from(self.total_beds)) as u32
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPriority {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl AlertPriority {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "critical" => AlertPriority::Critical,
            "high" => AlertPriority::High,
            "medium" => AlertPriority::Medium,
            _ => AlertPriority::Low,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmergencyAlert {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, alias = "codeType", deserialize_with = "lenient_string")]
    pub code_type: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub location: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: String,
    #[serde(default, deserialize_with = "lenient_priority")]
    pub priority: AlertPriority,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: String,
}

impl EmergencyAlert {
    /// Rows without a status column count as active.
    pub fn is_active(&self) -> bool {
        self.status.is_empty() || self.status.eq_ignore_ascii_case("active")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrugItem {
    #[serde(default, alias = "drugName", deserialize_with = "lenient_string")]
    pub drug_name: String,
    #[serde(default, alias = "currentStock", deserialize_with = "lenient_count")]
    pub current_stock: u32,
    #[serde(default, alias = "minStock", deserialize_with = "lenient_count")]
    pub min_stock: u32,
    #[serde(default, deserialize_with = "lenient_string")]
    pub unit: String,
    #[serde(default, alias = "expiryDate", deserialize_with = "lenient_string")]
    pub expiry_date: String,
}

impl DrugItem {
    pub fn is_low(&self) -> bool {
        self.current_stock < self.min_stock
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BloodStock {
    #[serde(default, alias = "bloodType", deserialize_with = "lenient_string")]
    pub blood_type: String,
    #[serde(default, alias = "unitsAvailable", deserialize_with = "lenient_count")]
    pub units_available: u32,
    #[serde(default, alias = "minUnits", deserialize_with = "lenient_count")]
    pub min_units: u32,
}

impl BloodStock {
    pub fn is_low(&self) -> bool {
        self.units_available < self.min_units
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OtRoom {
    #[serde(default, alias = "otId", deserialize_with = "lenient_string")]
    pub ot_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: String,
    #[serde(default, alias = "currentProcedure", deserialize_with = "lenient_string")]
    pub current_procedure: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub surgeon: String,
    #[serde(default, alias = "estimatedEnd", deserialize_with = "lenient_string")]
    pub estimated_end: String,
}

/// Read-only aggregate of hospital state, replaced wholesale on refresh
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HospitalSnapshot {
    pub token_queue: Vec<TokenEntry>,
    pub departments: Vec<Department>,
    pub emergency_alerts: Vec<EmergencyAlert>,
    pub drug_inventory: Vec<DrugItem>,
    pub blood_bank: Vec<BloodStock>,
    pub ot_status: Vec<OtRoom>,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl HospitalSnapshot {
    pub fn active_alerts(&self) -> impl Iterator<Item = &EmergencyAlert> {
        self.emergency_alerts.iter().filter(|a| a.is_active())
    }

    pub fn has_active_alert(&self) -> bool {
        self.active_alerts().next().is_some()
    }

    pub fn low_stock(&self) -> impl Iterator<Item = &DrugItem> {
        self.drug_inventory.iter().filter(|d| d.is_low())
    }
}
