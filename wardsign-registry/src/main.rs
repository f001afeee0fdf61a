/**
 * WARDSIGN REGISTRY - Point d'entrée du registre central des écrans
 *
 * RÔLE : Orchestration config, catalogue d'écrans, monitor de liveness,
 * publication des events de statut et API HTTP.
 *
 * ARCHITECTURE : API REST (heartbeats + données) + monitoring périodique + events MQTT.
 * UTILITÉ : Point unique de vérité sur les écrans qui affichent réellement.
 */

mod config;
mod data;
mod displays;
mod events;
mod health;
mod http;
mod models;

use crate::config::load_config;
use crate::data::HospitalData;
use crate::displays::{DisplayRegistry, SharedDisplayRegistry};
use crate::health::HealthTracker;
use crate::http::AppState;

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = load_config().await;

    if let Err(e) = tokio::fs::create_dir_all(&cfg.data_dir).await {
        warn!("[registry] failed to create data dir {}: {e}", cfg.data_dir);
    }

    let health = HealthTracker::new();

    // events de statut -> MQTT
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    events::spawn_status_publisher(cfg.mqtt.clone(), events_rx, health.clone());

    // catalogue persisté + écrans déclarés dans la config
    let registry = DisplayRegistry::new(&cfg.store_path).with_events(events_tx);
    if let Err(e) = registry.load_displays().await {
        warn!("[registry] failed to load displays: {e}");
    }
    let seeded = registry.seed(&cfg.displays).await;
    if seeded > 0 {
        info!("[registry] seeded {seeded} displays from config");
        if let Err(e) = registry.save_displays().await {
            warn!("[registry] failed to save seeded displays: {e}");
        }
    }
    let displays: SharedDisplayRegistry = Arc::new(registry);

    let stale_after = time::Duration::seconds(cfg.stale_after_secs as i64);
    DisplayRegistry::start_monitoring(
        displays.clone(),
        std::time::Duration::from_secs(cfg.monitor_interval_secs.max(1)),
        stale_after,
    );

    let app_state = AppState {
        displays,
        data: HospitalData::new(&cfg.data_dir),
        health,
        stale_after,
    };
    let app = http::build_router(app_state);

    let listener = TcpListener::bind(&cfg.bind)
        .await
        .with_context(|| format!("failed to bind {}", cfg.bind))?;
    info!("[registry] listening on http://{}", cfg.bind);
    axum::serve(listener, app).await.context("HTTP server failed")?;
    Ok(())
}
