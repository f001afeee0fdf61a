/*!
Jeux de données hospitalières pour les tests

Les mêmes données existent en deux formes:
- lignes JSON telles que servies par `GET /api/data/{resource}`
- fichiers CSV tels que lus depuis le répertoire de données

Les valeurs numériques sont des chaînes, comme dans les exports CSV.
*/

use anyhow::Result;
use serde_json::{Map, Value};
use std::path::Path;
use tempfile::TempDir;

/// Les six ressources et leurs noms de fichiers
pub const RESOURCES: [&str; 6] = [
    "token_queue",
    "departments",
    "emergency_alerts",
    "drug_inventory",
    "blood_bank",
    "ot_status",
];

pub struct HospitalFixtures;

impl HospitalFixtures {
    /// Contenu CSV d'une ressource (en-tête inclus)
    pub fn csv(resource: &str) -> Option<&'static str> {
        let csv = match resource {
            "token_queue" => {
                "token_number,patient_name,department,counter,status,estimated_wait\n\
                 T-101,Asha Rao,Cardiology,C1,serving,0\n\
                 T-102,Ravi Kumar,Cardiology,C1,waiting,12\n\
                 T-103,Meena Das,Orthopaedics,C2,waiting,abc\n"
            }
            "departments" => {
                "name,total_beds,occupied_beds,status\n\
                 ICU,20,18,critical\n\
                 General Ward,60,41,normal\n\
                 Maternity,24,12,normal\n"
            }
            "emergency_alerts" => {
                "id,code_type,location,message,priority,status\n\
                 ALR-1,Code Blue,ICU Bed 4,Cardiac arrest,critical,active\n\
                 ALR-2,Code Red,Kitchen,Smoke detected,high,resolved\n"
            }
            "drug_inventory" => {
                "drug_name,current_stock,min_stock,unit,expiry_date\n\
                 Insulin,4,10,vials,2027-01-31\n\
                 Paracetamol,540,100,tablets,2027-06-30\n"
            }
            "blood_bank" => {
                "blood_type,units_available,min_units\n\
                 O-,2,5\n\
                 A+,14,5\n\
                 \n\
                 B+,9,5\n"
            }
            "ot_status" => {
                "ot_id,status,current_procedure,surgeon,estimated_end\n\
                 OT-1,in_use,Appendectomy,Dr. Iyer,11:30\n\
                 OT-2,available,,,\n\
                 OT-3,cleaning,,,\n"
            }
            _ => return None,
        };
        Some(csv)
    }

    /// Lignes JSON d'une ressource, dérivées du CSV
    pub fn rows(resource: &str) -> Vec<Value> {
        let Some(csv) = Self::csv(resource) else {
            return Vec::new();
        };
        let mut lines = csv.lines().map(str::trim).filter(|l| !l.is_empty());
        let Some(header) = lines.next() else {
            return Vec::new();
        };
        let headers: Vec<&str> = header.split(',').collect();
        lines
            .map(|line| {
                let row: Map<String, Value> = headers
                    .iter()
                    .zip(line.split(',').chain(std::iter::repeat("")))
                    .map(|(h, v)| (h.to_string(), Value::String(v.to_string())))
                    .collect();
                Value::Object(row)
            })
            .collect()
    }

    /// Écrit les six fichiers CSV dans `dir`
    pub fn write_csv_files(dir: &Path) -> Result<()> {
        for resource in RESOURCES {
            if let Some(csv) = Self::csv(resource) {
                std::fs::write(dir.join(format!("{resource}.csv")), csv)?;
            }
        }
        log::info!("📁 Fixtures written to {}", dir.display());
        Ok(())
    }

    /// Répertoire temporaire contenant les six fichiers CSV
    pub fn write_fixture_dir() -> Result<TempDir> {
        let dir = tempfile::tempdir()?;
        Self::write_csv_files(dir.path())?;
        Ok(dir)
    }
}
