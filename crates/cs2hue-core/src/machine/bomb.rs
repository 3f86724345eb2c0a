// Bomb countdown: stage table resolution and the 1 Hz countdown clock.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::model::{BombStage, ColorTemplate, default_bomb_stages};

const DEFAULT_INITIAL_TIME: u32 = 40;
const SECOND: Duration = Duration::from_secs(1);

/// Resolved countdown behaviour for one plant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BombProfile {
    pub initial_time: u32,
    /// Blink period (ms) right after the plant; `0` means no blink.
    pub initial_speed: u64,
    stages: BTreeMap<u32, BombStage>,
}

impl BombProfile {
    /// Build the profile from the `bomb` template, if any.
    ///
    /// Stage entries fall back field-by-field to the built-in table; keys
    /// only present in the template add extra checkpoints.
    pub fn from_template(template: Option<&ColorTemplate>, default_blink_ms: u64) -> Self {
        let mut stages = default_bomb_stages();
        let Some(t) = template else {
            return Self {
                initial_time: DEFAULT_INITIAL_TIME,
                initial_speed: default_blink_ms,
                stages,
            };
        };

        for (secs, stage) in &t.stages {
            let base = stages.get(secs).copied().unwrap_or_default();
            stages.insert(
                *secs,
                BombStage {
                    bri: stage.bri.or(base.bri),
                    speed: stage.speed.or(base.speed),
                },
            );
        }

        Self {
            initial_time: t
                .initial_time
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_INITIAL_TIME),
            initial_speed: t
                .initial_stage
                .and_then(|s| s.speed)
                .or(t.initial_blink_speed)
                .unwrap_or(default_blink_ms),
            stages,
        }
    }

    /// The stage to apply when `remaining` seconds are left, if that is a checkpoint.
    pub fn stage_at(&self, remaining: u32) -> Option<BombStage> {
        self.stages.get(&remaining).copied()
    }
}

/// Seconds-remaining clock advanced by the machine tick.
#[derive(Debug, Clone)]
pub struct Countdown {
    pub remaining: u32,
    next_tick: Instant,
    pub profile: BombProfile,
}

impl Countdown {
    pub fn start(profile: BombProfile, now: Instant) -> Self {
        Self {
            remaining: profile.initial_time,
            next_tick: now + SECOND,
            profile,
        }
    }

    /// Consume one elapsed second, if due. Returns the new remaining time.
    pub fn advance(&mut self, now: Instant) -> Option<u32> {
        if now < self.next_tick || self.remaining == 0 {
            return None;
        }
        self.next_tick += SECOND;
        self.remaining -= 1;
        Some(self.remaining)
    }
}
