//! On-disk configuration for cs2hue.
//!
//! `config.toml` (figment: defaults, file, `CS2HUE_` environment), the
//! `colors.json` palette, bridge API key resolution (env, keyring,
//! plaintext), and translation into `cs2hue_core::OrchestratorConfig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cs2hue_core::{LightId, OrchestratorConfig, Palette};

const KEYRING_SERVICE: &str = "cs2hue";
const KEYRING_API_KEY: &str = "bridge/api-key";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no bridge API key configured")]
    NoCredentials,

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("invalid palette file {path}: {source}")]
    Palette {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level `config.toml`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Hue light ids driven by every scene.
    #[serde(default)]
    pub lights: Vec<String>,

    #[serde(default)]
    pub server: ServerConfig,

    /// Log the remaining bomb time at every countdown checkpoint.
    #[serde(default)]
    pub show_bomb_timer: bool,

    /// Game-state file. Defaults to `gamestate.json` in the data dir.
    pub gamestate_path: Option<PathBuf>,

    /// Palette file. Defaults to `colors.json` next to `config.toml`.
    pub colors_path: Option<PathBuf>,

    /// Where pre-start light states are kept. Defaults to the data dir.
    pub previous_state_path: Option<PathBuf>,

    #[serde(default)]
    pub tuning: Tuning,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BridgeConfig {
    /// Bridge IP, hostname, or URL.
    pub ip: Option<String>,

    /// API key (plaintext; prefer keyring or env var).
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,

    #[serde(default = "default_bridge_timeout")]
    pub timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            ip: None,
            api_key: None,
            api_key_env: None,
            timeout_ms: default_bridge_timeout(),
        }
    }
}

fn default_bridge_timeout() -> u64 {
    3000
}

/// HTTP surface: game-state ingest plus control endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8080
}
fn default_true() -> bool {
    true
}

/// Orchestrator timing knobs exposed in `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Tuning {
    pub fast_poll_ms: u64,
    pub idle_poll_ms: u64,
    pub fade_ms: u64,
    pub fade_steps: u32,
    pub verify_retries: u32,
    pub health_check: bool,
    pub health_interval_ms: u64,
    pub result_watchdog_ms: u64,
    /// Infer the winner from the bomb outcome when the game never reports one.
    pub infer_winner_from_bomb: bool,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            fast_poll_ms: 200,
            idle_poll_ms: 500,
            fade_ms: 5000,
            fade_steps: 10,
            verify_retries: 2,
            health_check: true,
            health_interval_ms: 2000,
            result_watchdog_ms: 5000,
            infer_winner_from_bomb: true,
        }
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "cs2hue", "cs2hue")
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("cs2hue");
    p
}

/// Directory holding `config.toml` and `colors.json`.
pub fn config_dir() -> PathBuf {
    project_dirs().map_or_else(dirs_fallback, |dirs| dirs.config_dir().to_path_buf())
}

/// Directory for runtime files (game state, previous light states).
pub fn data_dir() -> PathBuf {
    project_dirs().map_or_else(dirs_fallback, |dirs| dirs.data_dir().to_path_buf())
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

impl Config {
    pub fn gamestate_path(&self) -> PathBuf {
        self.gamestate_path
            .clone()
            .unwrap_or_else(|| data_dir().join("gamestate.json"))
    }

    pub fn colors_path(&self) -> PathBuf {
        self.colors_path
            .clone()
            .unwrap_or_else(|| config_dir().join("colors.json"))
    }

    pub fn previous_state_path(&self) -> PathBuf {
        self.previous_state_path
            .clone()
            .unwrap_or_else(|| data_dir().join("previous_state.json"))
    }

    pub fn light_ids(&self) -> Vec<LightId> {
        self.lights
            .iter()
            .flat_map(|raw| LightId::parse_list(raw))
            .collect()
    }

    /// Bridge address, required for anything that talks to the bridge.
    pub fn bridge_ip(&self) -> Result<&str, ConfigError> {
        self.bridge
            .ip
            .as_deref()
            .filter(|ip| !ip.trim().is_empty())
            .ok_or_else(|| ConfigError::Validation {
                field: "bridge.ip".into(),
                reason: "not set".into(),
            })
    }

    pub fn bridge_timeout(&self) -> Duration {
        Duration::from_millis(self.bridge.timeout_ms)
    }
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the config from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the config from `path` + environment. A missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("CS2HUE_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

// ── Palette ─────────────────────────────────────────────────────────

/// Load `colors.json`. A missing file yields the built-in palette;
/// built-in keys absent from the file are added disabled.
pub fn load_palette(path: &Path) -> Result<Palette, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Palette::builtin()),
        Err(e) => return Err(e.into()),
    };
    let mut palette: Palette = serde_json::from_str(&raw).map_err(|source| ConfigError::Palette {
        path: path.to_path_buf(),
        source,
    })?;
    palette.add_missing_defaults();
    Ok(palette)
}

pub fn save_palette(palette: &Palette, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(palette).map_err(|source| ConfigError::Palette {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the bridge API key: `api_key_env` → system keyring → plaintext.
pub fn resolve_api_key(bridge: &BridgeConfig) -> Result<SecretString, ConfigError> {
    // 1. Configured env var
    if let Some(ref env_name) = bridge.api_key_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, KEYRING_API_KEY) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref key) = bridge.api_key {
        return Ok(SecretString::from(key.clone()));
    }

    Err(ConfigError::NoCredentials)
}

/// Store the bridge API key in the system keyring.
pub fn store_api_key(key: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, KEYRING_API_KEY)?.set_password(key)?;
    Ok(())
}

// ── Orchestrator config ─────────────────────────────────────────────

/// Build the runtime orchestrator configuration.
pub fn to_orchestrator_config(cfg: &Config) -> Result<OrchestratorConfig, ConfigError> {
    let t = &cfg.tuning;
    if t.fade_steps == 0 {
        return Err(ConfigError::Validation {
            field: "tuning.fade_steps".into(),
            reason: "must be at least 1".into(),
        });
    }
    if t.fast_poll_ms == 0 || t.idle_poll_ms == 0 {
        return Err(ConfigError::Validation {
            field: "tuning.fast_poll_ms/idle_poll_ms".into(),
            reason: "must be positive".into(),
        });
    }

    let mut out = OrchestratorConfig::new(cfg.light_ids(), cfg.gamestate_path());
    out.previous_state_path = Some(cfg.previous_state_path());
    out.queue.io_timeout = cfg.bridge_timeout();
    out.queue.verify_retries = t.verify_retries;
    out.effects.fade_duration = Duration::from_millis(t.fade_ms);
    out.effects.fade_steps = t.fade_steps;
    out.machine.show_bomb_timer = cfg.show_bomb_timer;
    out.machine.result_watchdog = Duration::from_millis(t.result_watchdog_ms);
    out.machine.infer_winner_from_bomb = t.infer_winner_from_bomb;
    out.poller.fast_interval = Duration::from_millis(t.fast_poll_ms);
    out.poller.idle_interval = Duration::from_millis(t.idle_poll_ms);
    out.reconciler.enabled = t.health_check;
    out.reconciler.interval = Duration::from_millis(t.health_interval_ms);
    Ok(out)
}
