/*!
Registre d'affichage stub pour tests sans registre réel

Sert les mêmes routes que le registre pour un agent d'affichage:
- `POST /api/displays/heartbeat` (enregistré, 404 si écran inconnu)
- `GET /api/displays/{id}` (réglages de l'écran)
- `GET /api/data/{resource}` (lignes JSON, pannes simulables)

Écoute sur 127.0.0.1 avec un port libre; arrêté au drop.
*/

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Default)]
struct StubState {
    displays: HashMap<String, Value>,
    resources: HashMap<String, Vec<Value>>,
    failing: HashSet<String>,
    heartbeats: Vec<Value>,
    fail_next_heartbeats: u32,
}

pub struct StubRegistry {
    url: String,
    state: Arc<Mutex<StubState>>,
    server: JoinHandle<()>,
}

impl StubRegistry {
    /// Démarre le serveur stub sur un port libre
    pub async fn start() -> Result<Self> {
        let state = Arc::new(Mutex::new(StubState::default()));
        let app = Router::new()
            .route("/api/displays/heartbeat", post(heartbeat))
            .route("/api/displays/{id}", get(display))
            .route("/api/data/{resource}", get(resource))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("❌ [STUB] registry server stopped: {}", e);
            }
        });

        log::info!("🩺 [STUB] registry listening on {}", addr);
        Ok(Self { url: format!("http://{addr}"), state, server })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Déclare un écran connu du registre
    pub fn register_display(&self, display_id: &str, location: &str, content: &str) {
        let settings = serde_json::json!({
            "displayId": display_id,
            "location": location,
            "content": content,
            "config": null,
            "status": "offline",
            "pinnedView": null,
        });
        self.state.lock().unwrap().displays.insert(display_id.to_string(), settings);
    }

    /// Vue épinglée par l'administrateur (`None` pour reprendre la rotation)
    pub fn set_pinned_view(&self, display_id: &str, view: Option<&str>) {
        if let Some(settings) = self.state.lock().unwrap().displays.get_mut(display_id) {
            settings["pinnedView"] = view.map_or(Value::Null, |v| Value::String(v.to_string()));
        }
    }

    pub fn set_resource(&self, resource: &str, rows: Vec<Value>) {
        self.state.lock().unwrap().resources.insert(resource.to_string(), rows);
    }

    /// La ressource répond 500 jusqu'à `restore_resource`
    pub fn fail_resource(&self, resource: &str) {
        self.state.lock().unwrap().failing.insert(resource.to_string());
    }

    pub fn restore_resource(&self, resource: &str) {
        self.state.lock().unwrap().failing.remove(resource);
    }

    /// Les `n` prochains heartbeats reçoivent 503
    pub fn fail_next_heartbeats(&self, n: u32) {
        self.state.lock().unwrap().fail_next_heartbeats = n;
    }

    /// Heartbeats acceptés, dans l'ordre de réception
    pub fn heartbeats(&self) -> Vec<Value> {
        self.state.lock().unwrap().heartbeats.clone()
    }

    /// Statuts (`online`/`offline`) reçus pour un écran
    pub fn heartbeat_statuses(&self, display_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .heartbeats
            .iter()
            .filter(|hb| hb["displayId"] == display_id)
            .filter_map(|hb| hb["status"].as_str().map(str::to_string))
            .collect()
    }

    /// Reset des heartbeats enregistrés
    pub fn clear(&self) {
        self.state.lock().unwrap().heartbeats.clear();
    }
}

impl Drop for StubRegistry {
    fn drop(&mut self) {
        self.server.abort();
    }
}

type Shared = State<Arc<Mutex<StubState>>>;

async fn heartbeat(State(state): Shared, Json(body): Json<Value>) -> Result<Json<Value>, StatusCode> {
    let mut state = state.lock().unwrap();
    if state.fail_next_heartbeats > 0 {
        state.fail_next_heartbeats -= 1;
        log::warn!("💥 [STUB] heartbeat rejected (simulated failure)");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let (Some(id), Some(status)) = (body["displayId"].as_str(), body["status"].as_str()) else {
        return Err(StatusCode::BAD_REQUEST);
    };
    if !matches!(status, "online" | "offline") {
        return Err(StatusCode::BAD_REQUEST);
    }
    let (id, status) = (id.to_string(), status.to_string());
    let Some(settings) = state.displays.get_mut(&id) else {
        return Err(StatusCode::NOT_FOUND);
    };
    settings["status"] = Value::String(status.clone());
    state.heartbeats.push(body);

    log::info!("💓 [STUB] heartbeat {} -> {}", id, status);
    Ok(Json(serde_json::json!({ "ok": true, "status": status })))
}

async fn display(State(state): Shared, Path(id): Path<String>) -> Result<Json<Value>, StatusCode> {
    state.lock().unwrap().displays.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn resource(State(state): Shared, Path(resource): Path<String>) -> Result<Json<Vec<Value>>, StatusCode> {
    let state = state.lock().unwrap();
    if state.failing.contains(&resource) {
        log::warn!("💥 [STUB] resource {} failing", resource);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Ok(Json(state.resources.get(&resource).cloned().unwrap_or_default()))
}
