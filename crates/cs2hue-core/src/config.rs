// ── Runtime orchestrator configuration ──
//
// Tuning for every orchestrator component. Plain values only: the core
// never touches disk for configuration. `cs2hue-config` builds one of
// these from `config.toml` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use crate::model::{LightId, Tolerance};

/// Configuration for one orchestrator instance.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Lights driven by every scene.
    pub lights: Vec<LightId>,
    /// Game-state JSON document rewritten by the game (or the ingest server).
    pub snapshot_path: PathBuf,
    /// Where the pre-start light states are persisted. `None` keeps them in memory only.
    pub previous_state_path: Option<PathBuf>,
    pub queue: QueueConfig,
    pub scene: SceneConfig,
    pub effects: EffectConfig,
    pub machine: MachineConfig,
    pub poller: PollerConfig,
    pub reconciler: ReconcilerConfig,
}

impl OrchestratorConfig {
    pub fn new(lights: Vec<LightId>, snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            lights,
            snapshot_path: snapshot_path.into(),
            previous_state_path: None,
            queue: QueueConfig::default(),
            scene: SceneConfig::default(),
            effects: EffectConfig::default(),
            machine: MachineConfig::default(),
            poller: PollerConfig::default(),
            reconciler: ReconcilerConfig::default(),
        }
    }
}

/// Per-device write queue tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Upper bound for every gateway read or write.
    pub io_timeout: Duration,
    /// Pause after each successful write.
    pub post_write_gap: Duration,
    /// Delay between consecutive lights when fanning out.
    pub stagger: Duration,
    /// Minimum spacing between writes to one light. `None` uses the gateway's value.
    pub throttle: Option<Duration>,
    pub verify_retries: u32,
    pub verify_backoff: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            io_timeout: Duration::from_secs(2),
            post_write_gap: Duration::from_millis(60),
            stagger: Duration::from_millis(12),
            throttle: None,
            verify_retries: 2,
            verify_backoff: Duration::from_millis(150),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneConfig {
    /// Delay before the first read-back pass of `apply_color_with_fallback`.
    pub assert_delay: Duration,
    /// Delay before the final targeted sweep.
    pub final_sweep_delay: Duration,
    /// How long the reconciler stays quiet after a scene begins.
    pub health_quiet: Duration,
    pub tolerance: Tolerance,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            assert_delay: Duration::from_millis(400),
            final_sweep_delay: Duration::from_millis(900),
            health_quiet: Duration::from_millis(1500),
            tolerance: Tolerance::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectConfig {
    pub blink_min_period: Duration,
    pub default_blink_period: Duration,
    pub fade_duration: Duration,
    pub fade_steps: u32,
    /// How long past the end of a fade a light may stay off unchallenged.
    pub allowed_off_grace: Duration,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            blink_min_period: Duration::from_millis(120),
            default_blink_period: Duration::from_millis(1000),
            fade_duration: Duration::from_secs(5),
            fade_steps: 10,
            allowed_off_grace: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    /// Log the remaining bomb time at every checkpoint.
    pub show_bomb_timer: bool,
    /// Brightness used when the bomb template has none.
    pub bomb_fallback_bri: u8,
    /// How long a planted bomb must read as absent before it is reset.
    pub bomb_reset_grace: Duration,
    /// Minimum display time of the exploded/defused color before the result.
    pub result_hold: Duration,
    /// Force a round result this long after an explosion/defuse.
    pub result_watchdog: Duration,
    /// Force-resume when suppression lasts this long without a new round.
    /// A running fade is always allowed to finish first.
    pub suppression_bound: Duration,
    /// Infer the winner from the bomb outcome when the feed never reports one.
    pub infer_winner_from_bomb: bool,
    /// Apply the default color this long after start if nothing else has.
    pub startup_default_delay: Duration,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            show_bomb_timer: false,
            bomb_fallback_bri: 20,
            bomb_reset_grace: Duration::from_millis(500),
            result_hold: Duration::from_secs(2),
            result_watchdog: Duration::from_secs(5),
            suppression_bound: Duration::from_secs(5),
            infer_winner_from_bomb: true,
            startup_default_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    /// Cadence while a transitional state or effect is active.
    pub fast_interval: Duration,
    pub idle_interval: Duration,
    /// Delay of the single retry after a failed read.
    pub retry_delay: Duration,
    /// Minimum spacing between repeated snapshot warnings.
    pub warn_cooldown: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            fast_interval: Duration::from_millis(200),
            idle_interval: Duration::from_millis(500),
            retry_delay: Duration::from_millis(100),
            warn_cooldown: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub enabled: bool,
    pub interval: Duration,
    /// A light written more recently than this is never "corrected".
    pub write_race_guard: Duration,
    /// Brightness used when forcing a drifted light back on.
    pub restore_bri: u8,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(2),
            write_race_guard: Duration::from_secs(1),
            restore_bri: 100,
        }
    }
}
