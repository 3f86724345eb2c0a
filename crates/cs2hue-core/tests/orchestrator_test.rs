#![allow(clippy::unwrap_used)]
// Orchestrator lifecycle: idempotent start/stop, preflight, restore.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use common::FakeGateway;
use cs2hue_core::{
    CoreError, DeviceState, LightGateway, LightId, Orchestrator, OrchestratorConfig, Palette,
    RunState,
};

fn orchestrator(gw: &Arc<FakeGateway>, dir: &TempDir, lights: &[&str]) -> Orchestrator {
    let mut config = OrchestratorConfig::new(
        lights.iter().map(|id| LightId::new(*id)).collect(),
        dir.path().join("gamestate.json"),
    );
    config.previous_state_path = Some(dir.path().join("previous_state.json"));
    let gateway: Arc<dyn LightGateway> = gw.clone();
    Orchestrator::new(config, Palette::builtin(), gateway)
}

#[tokio::test]
async fn test_start_and_stop_are_idempotent() {
    let dir = TempDir::new().unwrap();
    let gw = FakeGateway::with_lights(&["1", "2"]);
    let orch = orchestrator(&gw, &dir, &["1", "2"]);

    assert!(orch.start().await.unwrap());
    assert!(!orch.start().await.unwrap());
    assert_eq!(orch.status().run_state, RunState::Running);
    assert!(orch.status().started_at.is_some());

    assert!(orch.stop().await.unwrap());
    assert!(!orch.stop().await.unwrap());
    let status = orch.status();
    assert_eq!(status.run_state, RunState::Stopped);
    assert_eq!(status.started_at, None);
}

#[tokio::test]
async fn test_stop_restores_captured_states() {
    let dir = TempDir::new().unwrap();
    let gw = FakeGateway::with_lights(&["1", "2"]);
    let original = DeviceState {
        on: true,
        bri: Some(180),
        xy: Some([0.45, 0.41]),
        ct: None,
    };
    gw.set("1", original.clone());
    gw.set(
        "2",
        DeviceState {
            on: false,
            ..DeviceState::default()
        },
    );
    let orch = orchestrator(&gw, &dir, &["1", "2"]);

    orch.start().await.unwrap();
    assert!(dir.path().join("previous_state.json").exists());

    // Startup default color kicks in after a second.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_ne!(gw.state("1"), original);

    orch.stop().await.unwrap();

    assert_eq!(gw.state("1"), original);
    assert!(!gw.state("2").on);
    assert!(!dir.path().join("previous_state.json").exists());
}

#[tokio::test]
async fn test_start_without_lights_fails() {
    let dir = TempDir::new().unwrap();
    let gw = FakeGateway::with_lights(&[]);
    let orch = orchestrator(&gw, &dir, &[]);

    let err = orch.start().await.unwrap_err();
    assert!(matches!(err, CoreError::NoLights));
    assert_eq!(orch.status().run_state, RunState::Stopped);
}

#[tokio::test]
async fn test_streaming_light_blocks_start() {
    let dir = TempDir::new().unwrap();
    let gw = FakeGateway::with_lights(&["1", "2"]);
    gw.set_streaming("2");
    let orch = orchestrator(&gw, &dir, &["1", "2"]);

    let err = orch.start().await.unwrap_err();
    assert!(matches!(err, CoreError::StreamingActive { ref light } if light == "2"));
    assert!(gw.writes().is_empty());
}

#[tokio::test]
async fn test_restart_keeps_epoch_moving_forward() {
    let dir = TempDir::new().unwrap();
    let gw = FakeGateway::with_lights(&["1"]);
    let orch = orchestrator(&gw, &dir, &["1"]);

    orch.start().await.unwrap();
    orch.stop().await.unwrap();
    let before = orch.status().epoch;

    assert!(orch.restart().await.unwrap());
    orch.stop().await.unwrap();
    assert!(orch.status().epoch > before);
}

#[tokio::test]
async fn test_start_cannot_slip_into_a_restart() {
    let dir = TempDir::new().unwrap();
    let gw = FakeGateway::with_lights(&["1", "2"]);
    let orch = orchestrator(&gw, &dir, &["1", "2"]);
    orch.start().await.unwrap();

    // Restart holds the lifecycle lock across its stop and start halves,
    // so the racing start always finds a running session.
    let (restarted, started) = tokio::join!(orch.restart(), orch.start());
    assert!(restarted.unwrap());
    assert!(!started.unwrap());
    assert_eq!(orch.status().run_state, RunState::Running);

    assert!(orch.stop().await.unwrap());
    assert!(!orch.stop().await.unwrap());
}
