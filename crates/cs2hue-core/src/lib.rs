//! Reactive lighting orchestrator between a CS2 game-state feed and
//! network-controlled lights.
//!
//! - **[`Orchestrator`]**: Facade owning one lighting session:
//!   [`start()`](Orchestrator::start) runs the gateway preflight, captures the
//!   current light states, and spawns the poll and health tasks;
//!   [`stop()`](Orchestrator::stop) restores what it captured.
//!
//! - **[`RoundMachine`]**: Round & bomb state machine. Consumes
//!   [`GameSnapshot`]s and time ticks, decides the active scene, and drives
//!   the bomb countdown, result watchdog and suppression window.
//!
//! - **[`SceneController`]**: Turns a [`ColorTemplate`] into writes for every
//!   light. Each scene advances the [`SceneEpoch`], voiding queued work from
//!   the previous one, and is confirmed by read-back in the background.
//!
//! - **[`DeviceQueues`]**: One FIFO worker per light with dedup, throttle,
//!   timeouts and optional verify + retry.
//!
//! - **[`EffectEngine`]**: Blink and fade generators.
//!
//! - **[`HealthReconciler`]**: Periodic backstop that re-enables lights
//!   which went dark without being asked to.
//!
//! - **[`LightGateway`]**: Device capability the core drives; [`HueGateway`]
//!   adapts the Hue bridge client from `cs2hue-api`.

pub mod config;
pub mod convert;
pub mod effects;
pub mod epoch;
pub mod error;
pub mod gateway;
pub mod machine;
pub mod model;
pub mod orchestrator;
pub mod poller;
pub mod presence;
pub mod queue;
pub mod reconciler;
pub mod scene;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{
    EffectConfig, MachineConfig, OrchestratorConfig, PollerConfig, QueueConfig, ReconcilerConfig,
    SceneConfig,
};
pub use effects::{EffectEngine, FadePlan};
pub use epoch::SceneEpoch;
pub use error::CoreError;
pub use gateway::{HueGateway, LightGateway};
pub use machine::{BombPhase, RoundMachine, RoundState};
pub use orchestrator::{Orchestrator, OrchestratorStatus, RunState};
pub use poller::{PollOutcome, Poller, SnapshotSource};
pub use presence::{ModeChange, PresenceEvent, PresenceHub};
pub use queue::{DeviceQueues, WriteOptions, WriteOutcome, WriteTicket};
pub use reconciler::HealthReconciler;
pub use scene::SceneController;

pub use model::{
    ColorMode, ColorTemplate, DeviceState, GameSnapshot, Intent, LightId, Palette, Team,
    Tolerance,
};
