/*!
Test Harness pour agents d'affichage WardSign

Facilite l'écriture de tests de bout en bout avec:
- Registre stub démarré et peuplé automatiquement
- Répertoire de données CSV temporaire
- Attentes sur les heartbeats reçus par le registre
*/

use crate::fixtures::{HospitalFixtures, RESOURCES};
use crate::stub_registry::StubRegistry;
use anyhow::Result;
use serde_json::Value;
use std::time::Duration;
use tempfile::TempDir;

/// Harness de test complet: registre stub + données
pub struct TestHarness {
    pub registry: StubRegistry,
    pub data_dir: TempDir,
}

impl TestHarness {
    /// Démarre un registre stub avec un écran `display_id` et toutes les ressources
    pub async fn new(display_id: &str) -> Result<Self> {
        env_logger::try_init().ok(); // Init logging pour tests

        let registry = StubRegistry::start().await?;
        registry.register_display(display_id, "Main Lobby", "Mixed Dashboard");
        for resource in RESOURCES {
            registry.set_resource(resource, HospitalFixtures::rows(resource));
        }

        let data_dir = HospitalFixtures::write_fixture_dir()?;
        Ok(Self { registry, data_dir })
    }

    pub fn url(&self) -> &str {
        self.registry.url()
    }

    /// Attend que `count` heartbeats aient été reçus
    pub async fn wait_for_heartbeats(&self, count: usize, timeout_ms: u64) -> Result<Vec<Value>> {
        let start = std::time::Instant::now();

        while start.elapsed() < Duration::from_millis(timeout_ms) {
            let heartbeats = self.registry.heartbeats();
            if heartbeats.len() >= count {
                log::info!("✅ Received {} heartbeat(s)", heartbeats.len());
                return Ok(heartbeats);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        anyhow::bail!(
            "Timeout waiting for {} heartbeat(s), got {}",
            count,
            self.registry.heartbeats().len()
        );
    }

    /// Assert sur la séquence de statuts reçus pour un écran
    pub fn assert_statuses(&self, display_id: &str, expected: &[&str]) -> Result<()> {
        let actual = self.registry.heartbeat_statuses(display_id);
        if actual != expected {
            anyhow::bail!("Heartbeat statuses for {}: expected {:?}, got {:?}", display_id, expected, actual);
        }
        log::info!("✅ {} statuses {:?}", display_id, actual);
        Ok(())
    }

    /// Reset le harness pour un nouveau scénario
    pub fn reset(&self) {
        self.registry.clear();
        for resource in RESOURCES {
            self.registry.restore_resource(resource);
        }
        log::info!("🧹 Test harness reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_harness_basic_functionality() {
        let harness = TestHarness::new("DISP-001").await.unwrap();
        assert!(harness.data_dir.path().join("departments.csv").exists());

        let body = serde_json::json!({
            "displayId": "DISP-001",
            "status": "online",
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        reqwest::Client::new()
            .post(format!("{}/api/displays/heartbeat", harness.url()))
            .json(&body)
            .send()
            .await
            .unwrap();

        let received = harness.wait_for_heartbeats(1, 2000).await.unwrap();
        assert_eq!(received[0]["displayId"], "DISP-001");
        harness.assert_statuses("DISP-001", &["online"]).unwrap();

        harness.reset();
        assert!(harness.registry.heartbeats().is_empty());
        assert!(harness.wait_for_heartbeats(1, 50).await.is_err());
    }
}
