//! Config subcommand handlers.

use std::path::Path;

use cs2hue_config::{Config, save_config_to, save_palette};
use cs2hue_core::Palette;

use super::{Loaded, colors_path_for};
use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

fn ensure_absent(path: &Path, force: bool) -> Result<(), CliError> {
    if !force && path.exists() {
        return Err(CliError::AlreadyExists {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

fn render_toml(cfg: &Config) -> Result<String, CliError> {
    toml::to_string_pretty(cfg).map_err(|e| CliError::Validation {
        field: "config".into(),
        reason: format!("failed to serialize config: {e}"),
    })
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            let path = global
                .config
                .clone()
                .unwrap_or_else(cs2hue_config::config_path);
            output::print_output(&path.display().to_string());
            Ok(())
        }

        ConfigCommand::Show => {
            let ctx = Loaded::load(global)?;
            let out = output::render_single(global.output, &ctx.config, render_toml)?;
            output::print_output(&out);
            Ok(())
        }

        ConfigCommand::Init { force } => {
            let path = global
                .config
                .clone()
                .unwrap_or_else(cs2hue_config::config_path);
            let cfg = Config::default();
            let colors = colors_path_for(&cfg, &path);

            ensure_absent(&path, force)?;
            save_config_to(&cfg, &path).map_err(|e| CliError::config(&path, e))?;
            eprintln!("✓ Configuration written to {}", path.display());

            if force || !colors.exists() {
                save_palette(&Palette::builtin(), &colors).map_err(|e| CliError::config(&path, e))?;
                eprintln!("✓ Palette written to {}", colors.display());
            }

            eprintln!("\n  Next: set bridge.ip and lights, then run: cs2hue lights");
            Ok(())
        }
    }
}
