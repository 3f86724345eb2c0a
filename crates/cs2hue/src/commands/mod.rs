//! Command dispatch and the loaded configuration shared by the handlers.

pub mod config_cmd;
pub mod lights;
pub mod run;

use std::path::{Path, PathBuf};

use cs2hue_api::{HueClient, TransportConfig};
use cs2hue_config::{Config, config_path, load_config_from, resolve_api_key};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// `config.toml` as loaded for this invocation, plus where it came from.
#[derive(Debug)]
pub struct Loaded {
    pub path: PathBuf,
    pub config: Config,
}

impl Loaded {
    /// Load from `--config` or the platform default path.
    pub fn load(global: &GlobalOpts) -> Result<Self, CliError> {
        let path = global.config.clone().unwrap_or_else(config_path);
        let config = load_config_from(&path).map_err(|e| CliError::config(&path, e))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(Self { path, config })
    }

    /// `colors.json`: the configured path, otherwise next to the config file.
    pub fn colors_path(&self) -> PathBuf {
        colors_path_for(&self.config, &self.path)
    }

    /// Bridge client with the resolved API key.
    pub fn hue_client(&self) -> Result<HueClient, CliError> {
        let ip = self
            .config
            .bridge_ip()
            .map_err(|e| CliError::config(&self.path, e))?;
        let key =
            resolve_api_key(&self.config.bridge).map_err(|e| CliError::config(&self.path, e))?;
        let transport = TransportConfig::default().with_timeout(self.config.bridge_timeout());
        Ok(HueClient::new(ip, &key, &transport)?)
    }
}

pub fn colors_path_for(config: &Config, config_file: &Path) -> PathBuf {
    config
        .colors_path
        .clone()
        .unwrap_or_else(|| config_file.with_file_name("colors.json"))
}
