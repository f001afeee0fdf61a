//! Live data simulation
//!
//! Drives a display without a data backend: starting from a seed snapshot,
//! applies small random mutations on a timer (queue movement, bed
//! occupancy, theatre turnover, stock drain, alerts raised and resolved)
//! and publishes each result to a `SnapshotStore`.
//!
//! The simulation is an owned value: nothing runs until `start()`, and
//! `stop()` (or dropping it) ends the background task.

use crate::fetch::SnapshotStore;
use crate::model::{AlertPriority, EmergencyAlert, HospitalSnapshot, TokenEntry};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const ALERT_TEMPLATES: &[(&str, &str, AlertPriority)] = &[
    ("Code Blue", "Cardiac arrest, response team required", AlertPriority::Critical),
    ("Code Red", "Fire alarm triggered, follow evacuation routes", AlertPriority::Critical),
    ("Code Pink", "Infant security alert", AlertPriority::High),
    ("Code Yellow", "Mass casualty incident, surge protocol", AlertPriority::High),
];

const ALERT_LOCATIONS: &[&str] = &["Ward 3", "ICU", "Emergency Bay 2", "Maternity Wing", "OPD Block"];

/// Resolved alerts kept after resolution; older ones are dropped.
pub const KEPT_RESOLVED_ALERTS: usize = 5;

pub struct LiveSimulation {
    store: SnapshotStore,
    period: Duration,
    seed: Option<u64>,
    handle: Option<JoinHandle<()>>,
}

impl LiveSimulation {
    /// `seed` makes the mutation sequence reproducible.
    pub fn new(store: SnapshotStore, period: Duration, seed: Option<u64>) -> Self {
        Self { store, period, seed, handle: None }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Starts mutating from the store's current snapshot. No-op if running.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        let store = self.store.clone();
        let period = self.period;
        let mut simulator = Simulator::new(match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        });
        let mut state = (*store.latest()).clone();

        info!("Live simulation started (every {:?})", period);
        self.handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                interval.tick().await;
                simulator.step(&mut state);
                store.replace(state.clone());
                debug!("Simulation tick published");
            }
        }));
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            info!("Live simulation stopped");
        }
    }
}

impl Drop for LiveSimulation {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Mutation source: the random generator plus the alert id sequence
pub struct Simulator<R> {
    rng: R,
    next_alert_id: u64,
}

impl<R: Rng> Simulator<R> {
    pub fn new(rng: R) -> Self {
        Self { rng, next_alert_id: 1 }
    }

    /// One round of mutations. Keeps every count within its bounds.
    pub fn step(&mut self, state: &mut HospitalSnapshot) {
        step(state, &mut self.rng, &mut self.next_alert_id);
    }
}

fn step<R: Rng>(state: &mut HospitalSnapshot, rng: &mut R, next_alert_id: &mut u64) {
    advance_queue(&mut state.token_queue, rng);

    for dept in &mut state.departments {
        match rng.gen_range(0..3) {
            0 => dept.occupied_beds = dept.occupied_beds.saturating_sub(1),
            1 if dept.occupied_beds < dept.total_beds => dept.occupied_beds += 1,
            _ => {}
        }
    }

    for room in &mut state.ot_status {
        if rng.gen_bool(0.1) {
            let next = match room.status.as_str() {
                "available" => "in_use",
                "in_use" => "cleaning",
                _ => "available",
            };
            room.status = next.to_string();
            if next != "in_use" {
                room.current_procedure.clear();
                room.surgeon.clear();
            }
        }
    }

    for drug in &mut state.drug_inventory {
        if rng.gen_bool(0.5) {
            drug.current_stock = drug.current_stock.saturating_sub(rng.gen_range(0..=3));
        }
    }

    for blood in &mut state.blood_bank {
        match rng.gen_range(0..4) {
            0 => blood.units_available = blood.units_available.saturating_sub(1),
            1 => blood.units_available = blood.units_available.saturating_add(1),
            _ => {}
        }
    }

    for alert in &mut state.emergency_alerts {
        if alert.is_active() && rng.gen_bool(0.05) {
            alert.status = "resolved".to_string();
        }
    }
    prune_resolved(&mut state.emergency_alerts);
    if rng.gen_bool(0.02) {
        let (code, message, priority) = ALERT_TEMPLATES[rng.gen_range(0..ALERT_TEMPLATES.len())];
        let location = ALERT_LOCATIONS[rng.gen_range(0..ALERT_LOCATIONS.len())];
        state.emergency_alerts.push(EmergencyAlert {
            id: format!("SIM-{next_alert_id}"),
            code_type: code.to_string(),
            location: location.to_string(),
            message: message.to_string(),
            priority,
            status: "active".to_string(),
        });
        *next_alert_id += 1;
    }

    state.fetched_at = Some(Utc::now());
}

/// Drops the oldest resolved alerts beyond `KEPT_RESOLVED_ALERTS`.
fn prune_resolved(alerts: &mut Vec<EmergencyAlert>) {
    let resolved = alerts.iter().filter(|a| !a.is_active()).count();
    let mut excess = resolved.saturating_sub(KEPT_RESOLVED_ALERTS);
    alerts.retain(|a| {
        if excess > 0 && !a.is_active() {
            excess -= 1;
            return false;
        }
        true
    });
}

fn advance_queue<R: Rng>(queue: &mut Vec<TokenEntry>, rng: &mut R) {
    for entry in queue.iter_mut().filter(|e| e.is_waiting()) {
        entry.estimated_wait = entry.estimated_wait.saturating_sub(rng.gen_range(0..=2));
    }

    if rng.gen_bool(0.3) {
        if let Some(serving) = queue.iter_mut().find(|e| e.is_serving()) {
            serving.status = "completed".to_string();
        }
        if let Some(next) = queue.iter_mut().find(|e| e.is_waiting()) {
            next.status = "serving".to_string();
            next.estimated_wait = 0;
        }
        queue.retain(|e| !e.status.eq_ignore_ascii_case("completed"));
    }

    if rng.gen_bool(0.2) {
        let last_wait = queue.iter().filter(|e| e.is_waiting()).map(|e| e.estimated_wait).max().unwrap_or(0);
        let department = queue.last().map(|e| e.department.clone()).unwrap_or_else(|| "General OPD".to_string());
        queue.push(TokenEntry {
            token_number: format!("S-{:03}", rng.gen_range(1..1000)),
            patient_name: String::new(),
            department,
            counter: String::new(),
            status: "waiting".to_string(),
            estimated_wait: last_wait.saturating_add(5),
        });
    }
}
