// ── Presence events ──
//
// Semantic "mode changed" notifications for optional external consumers
// (rich presence, overlays). Delivery is best-effort: with no subscriber,
// or a lagging one, events are simply dropped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

const PRESENCE_CHANNEL_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModeChange {
    Menu,
    Warmup,
    RoundStart,
    Planted,
    Defused,
    Exploded,
    Won,
    Lost,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceEvent {
    pub kind: ModeChange,
    pub at: DateTime<Utc>,
}

/// Fan-out point for [`PresenceEvent`]s.
#[derive(Debug, Clone)]
pub struct PresenceHub {
    tx: broadcast::Sender<PresenceEvent>,
}

impl Default for PresenceHub {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(PRESENCE_CHANNEL_SIZE);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, kind: ModeChange) {
        let _ = self.tx.send(PresenceEvent {
            kind,
            at: Utc::now(),
        });
    }
}
