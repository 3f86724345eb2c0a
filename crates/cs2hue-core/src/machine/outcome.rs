// Round outcome: win/loss classification and the result watchdog.

use tokio::time::Instant;

use crate::model::{BombState, Team};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Won,
    Lost,
}

impl Outcome {
    /// A round counts as won only when the player's side is known and matches.
    pub fn classify(player: Option<Team>, winner: Team) -> Self {
        if player == Some(winner) {
            Self::Won
        } else {
            Self::Lost
        }
    }
}

/// Side assumed to have won when the feed never reports `win_team`.
///
/// A heuristic, not a game rule: an explosion is credited to the
/// attackers and a defuse to the defenders.
pub fn fallback_winner(bomb: BombState) -> Option<Team> {
    match bomb {
        BombState::Exploded => Some(Team::Terrorists),
        BombState::Defused => Some(Team::CounterTerrorists),
        BombState::Planted | BombState::None => None,
    }
}

/// Forces a round result if none arrived in time after an explosion/defuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultWatchdog {
    pub deadline: Instant,
    pub fallback: Option<Team>,
}

impl ResultWatchdog {
    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}
