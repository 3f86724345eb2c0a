// ── Game-state snapshot ──
//
// Typed view of the game-state integration document. Every section and
// field is optional: the game omits whole blocks depending on context
// (menu, spectating, dead) and the file may be caught mid-rewrite.

use serde::{Deserialize, Serialize};

/// Side of the match. Also the palette key for the team color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    #[serde(rename = "CT")]
    CounterTerrorists,
    #[serde(rename = "T")]
    Terrorists,
    #[serde(other)]
    Unknown,
}

impl Team {
    /// Palette key holding this team's color.
    pub fn color_key(self) -> Option<&'static str> {
        match self {
            Self::CounterTerrorists => Some("CT"),
            Self::Terrorists => Some("T"),
            Self::Unknown => None,
        }
    }
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.color_key().unwrap_or("unknown"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activity {
    Menu,
    Playing,
    TextInput,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapPhase {
    Warmup,
    Live,
    Intermission,
    GameOver,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundPhase {
    Live,
    FreezeTime,
    Over,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Bomb status as reported in `round.bomb`. Absent means no bomb activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BombState {
    Planted,
    Defused,
    Exploded,
    #[default]
    #[serde(other)]
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerSection {
    #[serde(default)]
    pub team: Option<Team>,
    #[serde(default)]
    pub activity: Option<Activity>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamScore {
    #[serde(default)]
    pub score: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapSection {
    #[serde(default)]
    pub phase: Option<MapPhase>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub team_ct: Option<TeamScore>,
    #[serde(default)]
    pub team_t: Option<TeamScore>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundSection {
    #[serde(default)]
    pub phase: Option<RoundPhase>,
    #[serde(default)]
    pub bomb: Option<BombState>,
    #[serde(default)]
    pub win_team: Option<Team>,
}

/// One parsed game-state document. Replaced wholesale on every successful read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    #[serde(default)]
    pub player: Option<PlayerSection>,
    #[serde(default)]
    pub map: Option<MapSection>,
    #[serde(default)]
    pub round: Option<RoundSection>,
}

impl GameSnapshot {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn is_menu(&self) -> bool {
        self.player.as_ref().and_then(|p| p.activity) == Some(Activity::Menu)
    }

    pub fn is_warmup(&self) -> bool {
        self.map.as_ref().and_then(|m| m.phase) == Some(MapPhase::Warmup)
    }

    pub fn bomb(&self) -> BombState {
        self.round
            .as_ref()
            .and_then(|r| r.bomb)
            .unwrap_or_default()
    }

    pub fn round_phase(&self) -> Option<RoundPhase> {
        self.round.as_ref().and_then(|r| r.phase)
    }

    pub fn is_round_over(&self) -> bool {
        self.round_phase() == Some(RoundPhase::Over)
    }

    pub fn win_team(&self) -> Option<Team> {
        self.round
            .as_ref()
            .and_then(|r| r.win_team)
            .filter(|t| *t != Team::Unknown)
    }

    pub fn player_team(&self) -> Option<Team> {
        self.player
            .as_ref()
            .and_then(|p| p.team)
            .filter(|t| *t != Team::Unknown)
    }
}
