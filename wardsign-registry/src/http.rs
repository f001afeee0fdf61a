/**
 * API REST WARDSIGN - Serveur HTTP du registre d'écrans
 *
 * RÔLE :
 * Point d'entrée des écrans (heartbeat, données d'affichage) et de
 * l'administration (catalogue, épinglage de vue).
 *
 * ROUTES :
 * - GET  /health, /system/health
 * - POST /api/displays/heartbeat          {displayId, status, timestamp}
 * - GET  /api/displays, POST /api/displays
 * - GET|DELETE /api/displays/{id}
 * - PUT|DELETE /api/displays/{id}/pin     {view}
 * - GET  /api/displays/{id}/data          payload agrégé pour l'écran
 * - GET  /api/data/{resource}             sous-ressource CSV brute
 *
 * ERREURS : 400 corps invalide, 404 écran/ressource inconnu, 500 lecture CSV.
 */

use crate::data::{DataError, DisplayData, HospitalData, Record, Resource};
use crate::displays::{RegistryError, SharedDisplayRegistry};
use crate::health::{HealthTracker, RegistryHealth};
use crate::models::{DisplayEndpoint, DisplayRegistration, DisplayView, HeartbeatIn, PinRequest};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct AppState {
    pub displays: SharedDisplayRegistry,
    pub data: HospitalData,
    pub health: HealthTracker,
    pub stale_after: Duration,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/api/displays", get(list_displays).post(register_display))
        .route("/api/displays/heartbeat", post(heartbeat))
        .route("/api/displays/{id}", get(get_display).delete(delete_display))
        .route("/api/displays/{id}/pin", put(pin_view).delete(unpin_view))
        .route("/api/displays/{id}/data", get(get_display_data))
        .route("/api/data/{resource}", get(get_resource))
        .with_state(app_state)
}

fn registry_status(e: &RegistryError) -> StatusCode {
    match e {
        RegistryError::UnknownDisplay(_) => StatusCode::NOT_FOUND,
        RegistryError::ConfigMismatch(_) | RegistryError::EmptyId => StatusCode::BAD_REQUEST,
        RegistryError::Io(_) | RegistryError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// POST /api/displays/heartbeat
async fn heartbeat(
    State(app): State<AppState>,
    payload: Result<Json<HeartbeatIn>, JsonRejection>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let Json(hb) = payload.map_err(|e| {
        warn!("[http] invalid heartbeat body: {e}");
        StatusCode::BAD_REQUEST
    })?;
    let id = hb.display_id.clone();
    match app.displays.handle_heartbeat(hb, OffsetDateTime::now_utc()).await {
        Ok(status) => {
            debug!("[http] heartbeat {id} -> {status:?}");
            Ok(Json(serde_json::json!({ "ok": true, "status": status })))
        }
        Err(e) => Err(registry_status(&e)),
    }
}

// GET /api/displays
async fn list_displays(State(app): State<AppState>) -> Json<Vec<DisplayView>> {
    let now = OffsetDateTime::now_utc();
    let list = app
        .displays
        .list()
        .await
        .iter()
        .map(|d| DisplayView::from_endpoint(d, now, app.stale_after))
        .collect();
    Json(list)
}

// POST /api/displays
async fn register_display(
    State(app): State<AppState>,
    payload: Result<Json<DisplayRegistration>, JsonRejection>,
) -> Result<(StatusCode, Json<DisplayEndpoint>), StatusCode> {
    let Json(reg) = payload.map_err(|e| {
        warn!("[http] invalid registration body: {e}");
        StatusCode::BAD_REQUEST
    })?;
    let endpoint = app.displays.upsert(reg).await.map_err(|e| registry_status(&e))?;
    Ok((StatusCode::CREATED, Json(endpoint)))
}

// GET /api/displays/{id}
async fn get_display(State(app): State<AppState>, Path(id): Path<String>) -> Result<Json<DisplayView>, StatusCode> {
    let Some(d) = app.displays.get(&id).await else {
        return Err(StatusCode::NOT_FOUND);
    };
    Ok(Json(DisplayView::from_endpoint(&d, OffsetDateTime::now_utc(), app.stale_after)))
}

// DELETE /api/displays/{id}
async fn delete_display(State(app): State<AppState>, Path(id): Path<String>) -> StatusCode {
    match app.displays.remove(&id).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => registry_status(&e),
    }
}

// PUT /api/displays/{id}/pin
async fn pin_view(
    State(app): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<PinRequest>, JsonRejection>,
) -> StatusCode {
    let Ok(Json(req)) = payload else {
        return StatusCode::BAD_REQUEST;
    };
    match app.displays.set_pinned_view(&id, Some(req.view)).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => registry_status(&e),
    }
}

// DELETE /api/displays/{id}/pin
async fn unpin_view(State(app): State<AppState>, Path(id): Path<String>) -> StatusCode {
    match app.displays.set_pinned_view(&id, None).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => registry_status(&e),
    }
}

// GET /api/displays/{id}/data
async fn get_display_data(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DisplayData>, StatusCode> {
    let Some(display) = app.displays.get(&id).await else {
        return Err(StatusCode::NOT_FOUND);
    };
    Ok(Json(app.data.display_payload(&display).await))
}

// GET /api/data/{resource}
async fn get_resource(
    State(app): State<AppState>,
    Path(resource): Path<String>,
) -> Result<Json<Vec<Record>>, StatusCode> {
    let resource = Resource::parse(&resource).map_err(|_| StatusCode::NOT_FOUND)?;
    match app.data.read(resource).await {
        Ok(rows) => Ok(Json(rows)),
        Err(e) => {
            warn!("[http] failed to read {}: {e}", resource.slug());
            Err(match e {
                DataError::UnknownResource(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            })
        }
    }
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<RegistryHealth> {
    Json(app.health.get_health(&app.displays).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::displays::DisplayRegistry;
    use crate::models::{ContentType, DisplayStatus};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    async fn spawn_app(dir: &tempfile::TempDir) -> (String, SharedDisplayRegistry) {
        let displays = Arc::new(DisplayRegistry::new(dir.path().join("displays.json")));
        displays
            .upsert(DisplayRegistration {
                display_id: "DISP-001".into(),
                location: "Main Lobby".into(),
                content: ContentType::Mixed,
                config: None,
            })
            .await
            .unwrap();

        let state = AppState {
            displays: displays.clone(),
            data: HospitalData::new(dir.path()),
            health: HealthTracker::new(),
            stale_after: Duration::seconds(45),
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state)).await.unwrap();
        });
        (format!("http://{addr}"), displays)
    }

    #[tokio::test]
    async fn test_heartbeat_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let (base, displays) = spawn_app(&dir).await;
        let client = reqwest::Client::new();

        let res = client
            .post(format!("{base}/api/displays/heartbeat"))
            .json(&json!({"displayId": "DISP-001", "status": "online", "timestamp": "2026-10-18T08:00:00Z"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        assert_eq!(displays.get("DISP-001").await.unwrap().status, DisplayStatus::Online);

        let unknown = client
            .post(format!("{base}/api/displays/heartbeat"))
            .json(&json!({"displayId": "GHOST", "status": "online", "timestamp": "2026-10-18T08:00:00Z"}))
            .send()
            .await
            .unwrap();
        assert_eq!(unknown.status(), 404);

        let bad = client
            .post(format!("{base}/api/displays/heartbeat"))
            .json(&json!({"displayId": "DISP-001", "status": "busy", "timestamp": "x"}))
            .send()
            .await
            .unwrap();
        assert_eq!(bad.status(), 400);
    }

    #[tokio::test]
    async fn test_list_reports_staleness() {
        let dir = tempfile::tempdir().unwrap();
        let (base, _) = spawn_app(&dir).await;
        let list: Value = reqwest::get(format!("{base}/api/displays")).await.unwrap().json().await.unwrap();
        assert_eq!(list[0]["displayId"], "DISP-001");
        assert_eq!(list[0]["content"], "Mixed Dashboard");
        // jamais vu
        assert_eq!(list[0]["stale"], true);
        assert_eq!(list[0]["status"], "offline");
    }

    #[tokio::test]
    async fn test_pin_is_delivered_in_display_data() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("departments.csv"), "name,total_beds,occupied_beds\nICU,20,18\n").unwrap();
        let (base, _) = spawn_app(&dir).await;
        let client = reqwest::Client::new();

        let res = client
            .put(format!("{base}/api/displays/DISP-001/pin"))
            .json(&json!({"view": "emergency"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 204);

        let data: Value = client
            .get(format!("{base}/api/displays/DISP-001/data"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(data["pinnedView"], "emergency");
        assert_eq!(data["contentType"], "Mixed Dashboard");
        assert_eq!(data["departments"][0]["occupied_beds"], "18");
        assert_eq!(data["tokenQueue"], json!([]));

        let res = client.delete(format!("{base}/api/displays/DISP-001/pin")).send().await.unwrap();
        assert_eq!(res.status(), 204);
        let data: Value = client
            .get(format!("{base}/api/displays/DISP-001/data"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(data["pinnedView"].is_null());
    }

    #[tokio::test]
    async fn test_resource_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blood_bank.csv"), "blood_type,units_available\nO-,3\n").unwrap();
        let (base, _) = spawn_app(&dir).await;

        let rows: Value = reqwest::get(format!("{base}/api/data/blood_bank")).await.unwrap().json().await.unwrap();
        assert_eq!(rows[0]["blood_type"], "O-");

        let missing = reqwest::get(format!("{base}/api/data/ot_status")).await.unwrap();
        assert_eq!(missing.status(), 500);
        let unknown = reqwest::get(format!("{base}/api/data/patients")).await.unwrap();
        assert_eq!(unknown.status(), 404);
    }

    #[tokio::test]
    async fn test_register_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let (base, _) = spawn_app(&dir).await;
        let client = reqwest::Client::new();

        let res = client
            .post(format!("{base}/api/displays"))
            .json(&json!({
                "displayId": "DISP-002",
                "location": "OPD Block",
                "content": "Token Queue",
                "config": {"type": "token_queue", "counters": ["C1", "C2"]}
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 201);

        let mismatch = client
            .post(format!("{base}/api/displays"))
            .json(&json!({
                "displayId": "DISP-003",
                "location": "OPD Block",
                "content": "Token Queue",
                "config": {"type": "ot_status"}
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(mismatch.status(), 400);

        let bad_priority = client
            .post(format!("{base}/api/displays"))
            .json(&json!({
                "displayId": "DISP-004",
                "location": "ER",
                "content": "Emergency Alerts",
                "config": {"type": "emergency_alerts", "min_priority": "High"}
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(bad_priority.status(), 400);

        let res = client
            .post(format!("{base}/api/displays"))
            .json(&json!({
                "displayId": "DISP-004",
                "location": "ER",
                "content": "Emergency Alerts",
                "config": {"type": "emergency_alerts", "min_priority": "high"}
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 201);
        let view: Value = client.get(format!("{base}/api/displays/DISP-004")).send().await.unwrap().json().await.unwrap();
        assert_eq!(view["config"]["min_priority"], "high");

        let res = client.delete(format!("{base}/api/displays/DISP-002")).send().await.unwrap();
        assert_eq!(res.status(), 204);
        let res = client.get(format!("{base}/api/displays/DISP-002")).send().await.unwrap();
        assert_eq!(res.status(), 404);
    }
}
