// ── Color palette ──
//
// Named color templates (`menu`, `CT`, `bomb`, ...) as stored in
// `colors.json`. Read-only to the orchestrator; unknown or disabled keys
// simply resolve to `None`.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Palette keys the round machine looks up.
pub mod keys {
    pub const MENU: &str = "menu";
    pub const WARMUP: &str = "warmup";
    pub const BOMB: &str = "bomb";
    pub const EXPLODED: &str = "exploded";
    pub const DEFUSED: &str = "defused";
    pub const WIN: &str = "win";
    pub const LOSE: &str = "lose";
    pub const DEFAULT: &str = "default";
}

fn yes() -> bool {
    true
}

/// `null` and a missing key both mean "true".
fn null_as_true<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(d)?.unwrap_or(true))
}

fn null_as_false<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(d)?.unwrap_or(false))
}

fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<u32, BombStage>, D::Error> {
    Ok(Option::<BTreeMap<u32, BombStage>>::deserialize(d)?.unwrap_or_default())
}

/// One brightness/blink-speed pair of the bomb countdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BombStage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bri: Option<u16>,
    /// Blink period in milliseconds; `0` stops blinking and forces on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<u64>,
}

impl BombStage {
    pub const fn new(bri: u16, speed: u64) -> Self {
        Self {
            bri: Some(bri),
            speed: Some(speed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorTemplate {
    #[serde(default = "yes", deserialize_with = "null_as_true")]
    pub enabled: bool,
    #[serde(default = "yes", deserialize_with = "null_as_true")]
    pub on: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bri: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ct: Option<u16>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub use_ct: bool,

    // Bomb-only fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_time: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_blink_speed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_stage: Option<BombStage>,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub stages: BTreeMap<u32, BombStage>,
}

impl Default for ColorTemplate {
    fn default() -> Self {
        Self {
            enabled: true,
            on: true,
            bri: None,
            x: None,
            y: None,
            ct: None,
            use_ct: false,
            initial_time: None,
            initial_blink_speed: None,
            initial_stage: None,
            stages: BTreeMap::new(),
        }
    }
}

impl ColorTemplate {
    pub fn xy(bri: u16, x: f64, y: f64) -> Self {
        Self {
            bri: Some(bri),
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }
}

/// Named color templates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Palette(BTreeMap<String, ColorTemplate>);

impl Palette {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw lookup, ignoring the `enabled` flag.
    pub fn get(&self, key: &str) -> Option<&ColorTemplate> {
        self.0.get(key)
    }

    /// Lookup that treats disabled templates as missing.
    pub fn enabled(&self, key: &str) -> Option<&ColorTemplate> {
        self.0.get(key).filter(|t| t.enabled)
    }

    pub fn insert(&mut self, key: impl Into<String>, template: ColorTemplate) {
        self.0.insert(key.into(), template);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fill in every built-in key missing from this palette, disabled.
    ///
    /// Returns the keys that were added.
    pub fn add_missing_defaults(&mut self) -> Vec<String> {
        let mut added = Vec::new();
        for (key, template) in Self::builtin().0 {
            if !self.0.contains_key(&key) {
                self.0.insert(
                    key.clone(),
                    ColorTemplate {
                        enabled: false,
                        ..template
                    },
                );
                added.push(key);
            }
        }
        added
    }

    /// The built-in palette shipped with a fresh install.
    pub fn builtin() -> Self {
        let mut p = Self::new();
        p.insert(keys::MENU, ColorTemplate::xy(100, 0.3227, 0.329));
        p.insert(keys::WARMUP, ColorTemplate::xy(100, 0.3552, 0.398));
        p.insert("CT", ColorTemplate::xy(20, 0.1553, 0.1284));
        p.insert("T", ColorTemplate::xy(20, 0.5964, 0.3797));
        p.insert(
            keys::BOMB,
            ColorTemplate {
                initial_time: Some(40),
                initial_blink_speed: Some(1000),
                stages: default_bomb_stages(),
                ..ColorTemplate::xy(25, 0.675, 0.322)
            },
        );
        p.insert(
            keys::EXPLODED,
            ColorTemplate {
                ct: Some(318),
                ..ColorTemplate::xy(100, 0.5, 0.5)
            },
        );
        p.insert(keys::DEFUSED, ColorTemplate::xy(100, 0.1553, 0.1284));
        p.insert(keys::WIN, ColorTemplate::xy(254, 0.3246, 0.5805));
        p.insert(keys::LOSE, ColorTemplate::xy(254, 0.6401, 0.33));
        p.insert(keys::DEFAULT, ColorTemplate::xy(100, 0.2952, 0.5825));
        p
    }
}

/// Countdown checkpoints used when the bomb template has no stage table.
pub fn default_bomb_stages() -> BTreeMap<u32, BombStage> {
    BTreeMap::from([
        (30, BombStage::new(20, 750)),
        (20, BombStage::new(35, 500)),
        (12, BombStage::new(50, 250)),
        (5, BombStage::new(100, 150)),
        (2, BombStage::new(150, 0)),
    ])
}
