// ── Orchestrator ──
//
// Facade over one lighting session: preflight, previous-state capture,
// background poll and health tasks, and a clean shutdown that leaves the
// lights the way they were found.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::OrchestratorConfig;
use crate::effects::EffectEngine;
use crate::epoch::SceneEpoch;
use crate::error::CoreError;
use crate::gateway::LightGateway;
use crate::machine::{RoundMachine, RoundState};
use crate::model::{ColorMode, DeviceState, Intent, LightId, Palette};
use crate::poller::{Poller, SnapshotSource, poll_task};
use crate::presence::{PresenceEvent, PresenceHub};
use crate::queue::{DeviceQueues, WriteOptions};
use crate::reconciler::{HealthReconciler, reconciler_task};
use crate::scene::SceneController;

// ── RunState / status ────────────────────────────────────────────────

/// Lifecycle state observable by consumers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Point-in-time view of the orchestrator, served by the health endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrchestratorStatus {
    pub run_state: RunState,
    pub started_at: Option<DateTime<Utc>>,
    pub epoch: u64,
    pub mode: Option<ColorMode>,
    pub bomb_countdown: Option<u32>,
    pub suppressed: bool,
    pub lights: Vec<LightId>,
}

// ── Orchestrator ─────────────────────────────────────────────────────

/// Cheaply cloneable handle; every clone drives the same session.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<OrchestratorInner>,
}

struct OrchestratorInner {
    config: OrchestratorConfig,
    gateway: Arc<dyn LightGateway>,
    palette: Arc<ArcSwap<Palette>>,
    presence: PresenceHub,
    epoch: SceneEpoch,
    run_state: watch::Sender<RunState>,
    /// Serializes start/stop/restart.
    lifecycle: tokio::sync::Mutex<Option<Session>>,
    /// Read side of the running session, for `status()` without the lifecycle lock.
    view: Mutex<Option<SessionView>>,
    cancel: CancellationToken,
}

struct Session {
    queues: DeviceQueues,
    scene: SceneController,
    previous: BTreeMap<LightId, DeviceState>,
    cancel: CancellationToken,
    task_handles: Vec<JoinHandle<()>>,
}

#[derive(Clone)]
struct SessionView {
    round: watch::Receiver<RoundState>,
    started_at: DateTime<Utc>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, palette: Palette, gateway: Arc<dyn LightGateway>) -> Self {
        let (run_state, _) = watch::channel(RunState::Stopped);
        Self {
            inner: Arc::new(OrchestratorInner {
                config,
                gateway,
                palette: Arc::new(ArcSwap::from_pointee(palette)),
                presence: PresenceHub::new(),
                epoch: SceneEpoch::new(),
                run_state,
                lifecycle: tokio::sync::Mutex::new(None),
                view: Mutex::new(None),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    pub fn palette(&self) -> Arc<Palette> {
        self.inner.palette.load_full()
    }

    /// Swap the palette. Takes effect from the next scene on.
    pub fn set_palette(&self, palette: Palette) {
        info!(colors = palette.len(), "palette replaced");
        self.inner.palette.store(Arc::new(palette));
    }

    pub fn run_state(&self) -> watch::Receiver<RunState> {
        self.inner.run_state.subscribe()
    }

    pub fn subscribe_presence(&self) -> broadcast::Receiver<PresenceEvent> {
        self.inner.presence.subscribe()
    }

    pub fn is_running(&self) -> bool {
        *self.inner.run_state.borrow() == RunState::Running
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start driving the lights. Returns `Ok(false)` if already running.
    pub async fn start(&self) -> Result<bool, CoreError> {
        let mut slot = self.inner.lifecycle.lock().await;
        self.start_locked(&mut slot).await
    }

    /// Stop and restore the lights. Returns `Ok(false)` if not running.
    pub async fn stop(&self) -> Result<bool, CoreError> {
        let mut slot = self.inner.lifecycle.lock().await;
        Ok(self.stop_locked(&mut slot).await)
    }

    /// Stop (if running) and start again under one lifecycle lock, so no
    /// concurrent `start` or `stop` can slip in between.
    pub async fn restart(&self) -> Result<bool, CoreError> {
        let mut slot = self.inner.lifecycle.lock().await;
        self.stop_locked(&mut slot).await;
        self.start_locked(&mut slot).await
    }

    pub fn status(&self) -> OrchestratorStatus {
        let view = lock(&self.inner.view).clone();
        let round = view
            .as_ref()
            .map(|v| v.round.borrow().clone())
            .unwrap_or_default();
        OrchestratorStatus {
            run_state: *self.inner.run_state.borrow(),
            started_at: view.map(|v| v.started_at),
            epoch: self.inner.epoch.current(),
            mode: round.mode,
            bomb_countdown: round.bomb_countdown,
            suppressed: round.suppressed,
            lights: self.inner.config.lights.clone(),
        }
    }

    // ── Start / stop internals ───────────────────────────────────────

    async fn start_locked(&self, slot: &mut Option<Session>) -> Result<bool, CoreError> {
        if slot.is_some() {
            debug!("start requested while running; ignoring");
            return Ok(false);
        }

        self.inner.run_state.send_replace(RunState::Starting);
        match self.launch().await {
            Ok(session) => {
                *slot = Some(session);
                self.inner.run_state.send_replace(RunState::Running);
                info!(
                    gateway = self.inner.gateway.name(),
                    lights = self.inner.config.lights.len(),
                    "orchestrator started"
                );
                Ok(true)
            }
            Err(e) => {
                self.inner.run_state.send_replace(RunState::Stopped);
                Err(e)
            }
        }
    }

    async fn stop_locked(&self, slot: &mut Option<Session>) -> bool {
        let Some(session) = slot.take() else {
            debug!("stop requested while stopped; ignoring");
            return false;
        };

        self.inner.run_state.send_replace(RunState::Stopping);
        self.shutdown(session).await;
        *lock(&self.inner.view) = None;
        self.inner.run_state.send_replace(RunState::Stopped);
        info!("orchestrator stopped");
        true
    }

    async fn launch(&self) -> Result<Session, CoreError> {
        let config = &self.inner.config;
        if config.lights.is_empty() {
            return Err(CoreError::NoLights);
        }
        let lights: Arc<[LightId]> = config.lights.clone().into();
        self.inner.gateway.preflight(&lights).await?;

        let queues = DeviceQueues::new(
            Arc::clone(&self.inner.gateway),
            self.inner.epoch.clone(),
            config.queue.clone(),
            config.scene.tolerance,
        );
        let previous = self.previous_states(&queues, &lights).await;

        let effects = EffectEngine::new(queues.clone(), Arc::clone(&lights), config.effects.clone());
        let scene = SceneController::new(
            queues.clone(),
            effects,
            Arc::clone(&lights),
            config.scene.clone(),
        );
        let mut machine = RoundMachine::new(
            scene.clone(),
            Arc::clone(&self.inner.palette),
            config.machine.clone(),
            config.effects.clone(),
            self.inner.presence.clone(),
        );
        machine.arm_startup_default();
        let round = machine.subscribe();

        let cancel = self.inner.cancel.child_token();
        let mut task_handles = Vec::with_capacity(2);

        let poller = Poller::new(
            SnapshotSource::new(&config.snapshot_path),
            machine,
            config.poller.clone(),
        );
        task_handles.push(tokio::spawn(poll_task(poller, cancel.clone())));

        if config.reconciler.enabled {
            let reconciler =
                HealthReconciler::new(scene.clone(), round.clone(), config.reconciler.clone());
            task_handles.push(tokio::spawn(reconciler_task(
                reconciler,
                config.reconciler.interval,
                cancel.clone(),
            )));
        }

        *lock(&self.inner.view) = Some(SessionView {
            round,
            started_at: Utc::now(),
        });

        Ok(Session {
            queues,
            scene,
            previous,
            cancel,
            task_handles,
        })
    }

    /// Light states to restore on stop.
    ///
    /// A state file left behind by an unclean shutdown wins over a fresh
    /// capture: the lights still show game colors in that case.
    async fn previous_states(
        &self,
        queues: &DeviceQueues,
        lights: &[LightId],
    ) -> BTreeMap<LightId, DeviceState> {
        let path = self.inner.config.previous_state_path.as_deref();
        if let Some(path) = path {
            if let Some(saved) = load_previous(path).await {
                info!(path = %path.display(), "restoring light states left by an unclean shutdown");
                return saved;
            }
        }

        let reads = lights.iter().map(|id| async move {
            match queues.read_state(id).await {
                Ok(state) => Some((id.clone(), state)),
                Err(e) => {
                    warn!(light = %id, error = %e, "could not capture light state");
                    None
                }
            }
        });
        let captured: BTreeMap<LightId, DeviceState> =
            join_all(reads).await.into_iter().flatten().collect();
        debug!(count = captured.len(), "captured previous light states");

        if let Some(path) = path {
            if let Err(e) = save_previous(path, &captured).await {
                warn!(path = %path.display(), error = %e, "could not persist previous light states");
            }
        }
        captured
    }

    async fn shutdown(&self, session: Session) {
        let Session {
            queues,
            scene,
            previous,
            cancel,
            task_handles,
        } = session;

        cancel.cancel();
        for handle in task_handles {
            let _ = handle.await;
        }

        scene.begin_scene("shutdown").await;
        let restores = scene.lights().iter().map(|id| {
            let target = previous.get(id).map_or_else(Intent::off, Intent::from);
            restore_light(&queues, id, target)
        });
        join_all(restores).await;

        if let Some(path) = self.inner.config.previous_state_path.as_deref() {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "could not remove previous state file"),
            }
        }
        queues.shutdown();
    }
}

async fn restore_light(queues: &DeviceQueues, id: &LightId, target: Intent) {
    let outcome = queues
        .enqueue(id, target.clone(), WriteOptions::forced())
        .outcome()
        .await;
    if outcome.reached_device() || target.requests_off() {
        return;
    }
    warn!(light = %id, %outcome, "restore failed; turning light off");
    let _ = queues
        .enqueue(id, Intent::off(), WriteOptions::forced())
        .outcome()
        .await;
}

async fn load_previous(path: &Path) -> Option<BTreeMap<LightId, DeviceState>> {
    let raw = tokio::fs::read_to_string(path).await.ok()?;
    match serde_json::from_str(&raw) {
        Ok(states) => Some(states),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable previous state file");
            None
        }
    }
}

async fn save_previous(path: &Path, states: &BTreeMap<LightId, DeviceState>) -> Result<(), CoreError> {
    let json = serde_json::to_string_pretty(states).map_err(|e| CoreError::Internal(e.to_string()))?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, json).await?;
    Ok(())
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
