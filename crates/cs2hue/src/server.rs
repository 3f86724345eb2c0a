//! HTTP surface: game-state ingest and orchestrator control.
//!
//! The game client POSTs its state to `/` and never retries, so ingest
//! always answers 200 and only logs what it could not store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cs2hue_core::{CoreError, Orchestrator, OrchestratorStatus};

// ── State ────────────────────────────────────────────────────────────

/// Shared across handlers.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Orchestrator,
    snapshot_path: Arc<PathBuf>,
    colors_path: Arc<PathBuf>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, colors_path: PathBuf) -> Self {
        let snapshot_path = orchestrator.config().snapshot_path.clone();
        Self {
            orchestrator,
            snapshot_path: Arc::new(snapshot_path),
            colors_path: Arc::new(colors_path),
        }
    }
}

// ── Router ───────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(ingest))
        .route("/health", get(health))
        .route("/control/start", post(control_start))
        .route("/control/stop", post(control_stop))
        .route("/control/restart", post(control_restart))
        .route("/control/reload", post(control_reload))
        .with_state(state)
}

/// Serve until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "listening for game state");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}

// ── Ingest ───────────────────────────────────────────────────────────

async fn ingest(State(state): State<AppState>, body: Bytes) -> StatusCode {
    if let Err(e) = serde_json::from_slice::<serde_json::Value>(&body) {
        warn!(error = %e, bytes = body.len(), "discarding game state that is not JSON");
        return StatusCode::OK;
    }
    match write_snapshot(&state.snapshot_path, &body).await {
        Ok(()) => debug!(bytes = body.len(), "game state stored"),
        Err(e) => warn!(
            error = %e,
            path = %state.snapshot_path.display(),
            "failed to store game state"
        ),
    }
    StatusCode::OK
}

/// Replace `path` with `body` so readers never see a partial file.
pub async fn write_snapshot(path: &Path, body: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await
}

// ── Status & control ─────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> Json<OrchestratorStatus> {
    Json(state.orchestrator.status())
}

#[derive(Debug, Serialize)]
struct ControlReply {
    changed: bool,
    status: OrchestratorStatus,
}

impl ControlReply {
    fn new(changed: bool, orchestrator: &Orchestrator) -> Json<Self> {
        Json(Self {
            changed,
            status: orchestrator.status(),
        })
    }
}

async fn control_start(State(state): State<AppState>) -> Result<Json<ControlReply>, ApiError> {
    let changed = state.orchestrator.start().await?;
    Ok(ControlReply::new(changed, &state.orchestrator))
}

async fn control_stop(State(state): State<AppState>) -> Result<Json<ControlReply>, ApiError> {
    let changed = state.orchestrator.stop().await?;
    Ok(ControlReply::new(changed, &state.orchestrator))
}

async fn control_restart(State(state): State<AppState>) -> Result<Json<ControlReply>, ApiError> {
    let changed = state.orchestrator.restart().await?;
    Ok(ControlReply::new(changed, &state.orchestrator))
}

async fn control_reload(State(state): State<AppState>) -> Result<Json<ControlReply>, ApiError> {
    let palette = cs2hue_config::load_palette(&state.colors_path).map_err(|e| ApiError {
        status: StatusCode::UNPROCESSABLE_ENTITY,
        message: e.to_string(),
    })?;
    state.orchestrator.set_palette(palette);
    Ok(ControlReply::new(true, &state.orchestrator))
}

// ── Errors ───────────────────────────────────────────────────────────

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match err {
            CoreError::NoLights | CoreError::StreamingActive { .. } => StatusCode::CONFLICT,
            CoreError::Unreachable { .. } | CoreError::Timeout { .. } | CoreError::Gateway { .. } => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(status = %self.status, error = %self.message, "control request failed");
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::Mutex;

    use async_trait::async_trait;
    use cs2hue_core::{
        DeviceState, Intent, LightGateway, LightId, OrchestratorConfig, Palette,
    };
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    /// Lights that accept every write and report it back.
    #[derive(Default)]
    struct EchoGateway {
        states: Mutex<std::collections::HashMap<LightId, DeviceState>>,
    }

    #[async_trait]
    impl LightGateway for EchoGateway {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn get_state(&self, id: &LightId) -> Result<DeviceState, CoreError> {
            let states = self.states.lock().unwrap();
            Ok(states.get(id).cloned().unwrap_or(DeviceState {
                on: true,
                bri: Some(254),
                xy: None,
                ct: None,
            }))
        }

        async fn set_state(&self, id: &LightId, intent: &Intent) -> Result<(), CoreError> {
            let mut states = self.states.lock().unwrap();
            let state = states.entry(id.clone()).or_default();
            if let Some(on) = intent.on {
                state.on = on;
            }
            if intent.bri.is_some() {
                state.bri = intent.bri;
            }
            if intent.xy.is_some() {
                state.xy = intent.xy;
            }
            Ok(())
        }
    }

    async fn spawn_server(dir: &TempDir, lights: &[&str]) -> (String, CancellationToken) {
        let mut config = OrchestratorConfig::new(
            lights.iter().map(|id| LightId::new(*id)).collect(),
            dir.path().join("state").join("gamestate.json"),
        );
        config.previous_state_path = None;
        config.reconciler.enabled = false;
        let gateway: Arc<dyn LightGateway> = Arc::new(EchoGateway::default());
        let orchestrator = Orchestrator::new(config, Palette::builtin(), gateway);
        let state = AppState::new(orchestrator, dir.path().join("colors.json"));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let cancel = CancellationToken::new();
        tokio::spawn(serve(listener, state, cancel.clone()));
        (base, cancel)
    }

    #[tokio::test]
    async fn ingest_stores_valid_json_atomically() {
        let dir = TempDir::new().unwrap();
        let (base, cancel) = spawn_server(&dir, &["1"]).await;
        let client = reqwest::Client::new();

        let payload = r#"{"player":{"activity":"menu"}}"#;
        let resp = client.post(&base).body(payload).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        let path = dir.path().join("state").join("gamestate.json");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), payload);
        assert!(!path.with_extension("json.tmp").exists());
        cancel.cancel();
    }

    #[tokio::test]
    async fn ingest_acknowledges_but_drops_garbage() {
        let dir = TempDir::new().unwrap();
        let (base, cancel) = spawn_server(&dir, &["1"]).await;
        let client = reqwest::Client::new();

        let resp = client.post(&base).body("{ nope").send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert!(!dir.path().join("state").join("gamestate.json").exists());
        cancel.cancel();
    }

    #[tokio::test]
    async fn control_start_and_stop_are_idempotent() {
        let dir = TempDir::new().unwrap();
        let (base, cancel) = spawn_server(&dir, &["1", "2"]).await;
        let client = reqwest::Client::new();

        let health: serde_json::Value = client
            .get(format!("{base}/health"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["run_state"], "stopped");

        let reply: serde_json::Value = client
            .post(format!("{base}/control/start"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(reply["changed"], true);
        assert_eq!(reply["status"]["run_state"], "running");

        let reply: serde_json::Value = client
            .post(format!("{base}/control/start"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(reply["changed"], false);

        let reply: serde_json::Value = client
            .post(format!("{base}/control/stop"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(reply["changed"], true);
        assert_eq!(reply["status"]["run_state"], "stopped");
        cancel.cancel();
    }

    #[tokio::test]
    async fn control_start_without_lights_is_a_conflict() {
        let dir = TempDir::new().unwrap();
        let (base, cancel) = spawn_server(&dir, &[]).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/control/start"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::CONFLICT);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("light"));
        cancel.cancel();
    }

    #[tokio::test]
    async fn reload_reports_malformed_palette() {
        let dir = TempDir::new().unwrap();
        let (base, cancel) = spawn_server(&dir, &["1"]).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/control/reload"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        std::fs::write(dir.path().join("colors.json"), "{ broken").unwrap();
        let resp = client
            .post(format!("{base}/control/reload"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
        cancel.cancel();
    }
}
