/*!
# WardSign DevKit - Stubs et utilitaires de test

Bibliothèque facilitant le test des agents d'affichage avec:
- Registre HTTP stub (heartbeats, données, réglages d'écran)
- Jeux de données hospitalières (JSON et CSV)
- Harness de test avec attentes sur les heartbeats reçus
*/

pub mod fixtures;
pub mod stub_registry;
pub mod test_utils;

pub use fixtures::HospitalFixtures;
pub use stub_registry::StubRegistry;
pub use test_utils::TestHarness;
