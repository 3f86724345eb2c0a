#![allow(clippy::unwrap_used, dead_code)]
// Shared fixtures for core integration tests: a recording in-memory
// gateway and builders for the orchestrator components.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde_json::Value;

use cs2hue_core::config::{EffectConfig, MachineConfig, QueueConfig, SceneConfig};
use cs2hue_core::{
    CoreError, DeviceQueues, DeviceState, EffectEngine, GameSnapshot, Intent, LightGateway,
    LightId, Palette, PresenceHub, RoundMachine, SceneController, SceneEpoch, Tolerance,
};

// ── FakeGateway ─────────────────────────────────────────────────────

/// In-memory lights that apply every write and record it.
pub struct FakeGateway {
    states: Mutex<HashMap<LightId, DeviceState>>,
    writes: Mutex<Vec<(LightId, Intent)>>,
    failing: AtomicBool,
    /// Lights that accept writes without changing state.
    ignoring: Mutex<HashSet<LightId>>,
    streaming: Mutex<HashSet<LightId>>,
    spacing: Duration,
}

impl FakeGateway {
    pub fn with_lights(ids: &[&str]) -> Arc<Self> {
        let states = ids
            .iter()
            .map(|id| {
                (
                    LightId::new(*id),
                    DeviceState {
                        on: true,
                        bri: Some(254),
                        xy: Some([0.3, 0.3]),
                        ct: None,
                    },
                )
            })
            .collect();
        Arc::new(Self {
            states: Mutex::new(states),
            writes: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            ignoring: Mutex::new(HashSet::new()),
            streaming: Mutex::new(HashSet::new()),
            spacing: Duration::from_millis(100),
        })
    }

    pub fn writes(&self) -> Vec<(LightId, Intent)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn writes_for(&self, id: &str) -> Vec<Intent> {
        self.writes()
            .into_iter()
            .filter(|(light, _)| light.as_str() == id)
            .map(|(_, intent)| intent)
            .collect()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().unwrap().clear();
    }

    pub fn state(&self, id: &str) -> DeviceState {
        self.states.lock().unwrap()[&LightId::new(id)].clone()
    }

    /// Change a light behind the orchestrator's back.
    pub fn set(&self, id: &str, state: DeviceState) {
        self.states.lock().unwrap().insert(LightId::new(id), state);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn ignore_writes(&self, id: &str) {
        self.ignoring.lock().unwrap().insert(LightId::new(id));
    }

    pub fn set_streaming(&self, id: &str) {
        self.streaming.lock().unwrap().insert(LightId::new(id));
    }
}

#[async_trait]
impl LightGateway for FakeGateway {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn get_state(&self, id: &LightId) -> Result<DeviceState, CoreError> {
        self.states
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::Gateway {
                message: format!("no light {id}"),
                code: Some(3),
            })
    }

    async fn set_state(&self, id: &LightId, intent: &Intent) -> Result<(), CoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CoreError::Gateway {
                message: "bridge busy".into(),
                code: Some(901),
            });
        }
        self.writes.lock().unwrap().push((id.clone(), intent.clone()));
        if self.ignoring.lock().unwrap().contains(id) {
            return Ok(());
        }

        let mut states = self.states.lock().unwrap();
        let state = states.entry(id.clone()).or_default();
        if let Some(on) = intent.on {
            state.on = on;
        }
        if let Some(bri) = intent.bri {
            state.bri = Some(bri);
        }
        if let Some(xy) = intent.xy {
            state.xy = Some(xy);
        }
        if let Some(ct) = intent.ct {
            state.ct = Some(ct);
        }
        Ok(())
    }

    fn write_spacing(&self) -> Duration {
        self.spacing
    }

    async fn preflight(&self, lights: &[LightId]) -> Result<(), CoreError> {
        let streaming = self.streaming.lock().unwrap();
        if let Some(id) = lights.iter().find(|id| streaming.contains(*id)) {
            return Err(CoreError::StreamingActive {
                light: id.to_string(),
            });
        }
        Ok(())
    }
}

// ── Builders ────────────────────────────────────────────────────────

pub fn ids(ids: &[&str]) -> Arc<[LightId]> {
    ids.iter().map(|id| LightId::new(*id)).collect()
}

pub fn queues(gateway: &Arc<FakeGateway>) -> DeviceQueues {
    let gateway: Arc<dyn LightGateway> = gateway.clone();
    DeviceQueues::new(
        gateway,
        SceneEpoch::new(),
        QueueConfig::default(),
        Tolerance::default(),
    )
}

pub fn scene(gateway: &Arc<FakeGateway>, lights: &[&str]) -> SceneController {
    let queues = queues(gateway);
    let lights = ids(lights);
    let effects = EffectEngine::new(queues.clone(), Arc::clone(&lights), EffectConfig::default());
    SceneController::new(queues, effects, lights, SceneConfig::default())
}

pub fn machine(scene: &SceneController, palette: Palette) -> RoundMachine {
    RoundMachine::new(
        scene.clone(),
        Arc::new(ArcSwap::from_pointee(palette)),
        MachineConfig::default(),
        EffectConfig::default(),
        PresenceHub::new(),
    )
}

pub fn snapshot(value: Value) -> GameSnapshot {
    serde_json::from_value(value).unwrap()
}

/// Let queued writes, read-backs and confirmations run their course.
pub async fn settle(duration: Duration) {
    tokio::time::sleep(duration).await;
}
