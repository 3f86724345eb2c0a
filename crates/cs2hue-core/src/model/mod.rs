// ── Domain model ──
//
// Value types shared by every orchestrator component.

pub mod device;
pub mod intent;
pub mod palette;
pub mod snapshot;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use device::{DeviceState, LightId};
pub use intent::{Intent, MAX_BRI, MIN_BRI, Tolerance, clamp_bri};
pub use palette::{BombStage, ColorTemplate, Palette, default_bomb_stages, keys};
pub use snapshot::{
    Activity, BombState, GameSnapshot, MapPhase, MapSection, PlayerSection, RoundPhase,
    RoundSection, Team, TeamScore,
};

/// The scene most recently applied by the round machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    Menu,
    Warmup,
    Team(Team),
    Default,
    Bomb,
    Exploded,
    Defused,
    Win,
    Lose,
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Menu => f.write_str("menu"),
            Self::Warmup => f.write_str("warmup"),
            Self::Team(team) => write!(f, "team {team}"),
            Self::Default => f.write_str("default"),
            Self::Bomb => f.write_str("bomb"),
            Self::Exploded => f.write_str("exploded"),
            Self::Defused => f.write_str("defused"),
            Self::Win => f.write_str("win"),
            Self::Lose => f.write_str("lose"),
        }
    }
}
