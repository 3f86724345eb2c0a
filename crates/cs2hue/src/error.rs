//! CLI error types with miette diagnostics.
//!
//! Maps core, config and bridge errors into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use cs2hue_config::ConfigError;
use cs2hue_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Bridge ───────────────────────────────────────────────────────
    #[error("Could not reach the Hue bridge at {target}")]
    #[diagnostic(
        code(cs2hue::connection_failed),
        help(
            "Check that the bridge is powered and on the same network.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { target: String, reason: String },

    #[error("Bridge request timed out after {timeout_ms}ms")]
    #[diagnostic(
        code(cs2hue::timeout),
        help("Raise bridge.timeout_ms in config.toml or check the bridge's responsiveness.")
    )]
    Timeout { timeout_ms: u64 },

    #[error("Bridge rejected the request: {message}")]
    #[diagnostic(code(cs2hue::bridge))]
    Bridge { message: String },

    #[error("The bridge rejected the API key")]
    #[diagnostic(
        code(cs2hue::auth_failed),
        help(
            "Create a new key by pressing the bridge link button, then store it\n\
             in bridge.api_key, the keyring, or the variable named by bridge.api_key_env."
        )
    )]
    AuthFailed,

    #[error("No bridge API key configured")]
    #[diagnostic(
        code(cs2hue::no_credentials),
        help(
            "Set bridge.api_key in {path},\n\
             or point bridge.api_key_env at an environment variable holding the key."
        )
    )]
    NoCredentials { path: String },

    // ── Lights ───────────────────────────────────────────────────────
    #[error("No lights configured")]
    #[diagnostic(
        code(cs2hue::no_lights),
        help(
            "List the bridge's lights with: cs2hue lights\n\
             then add their ids to `lights` in {path}"
        )
    )]
    NoLights { path: String },

    #[error("Light {light} is in an entertainment (streaming) session")]
    #[diagnostic(
        code(cs2hue::streaming_active),
        help("Stop the entertainment area sync in the Hue app, then try again.")
    )]
    StreamingActive { light: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(cs2hue::validation))]
    Validation { field: String, reason: String },

    #[error("{path} already exists")]
    #[diagnostic(
        code(cs2hue::already_exists),
        help("Pass --force to overwrite it.")
    )]
    AlreadyExists { path: String },

    #[error("Failed to load configuration: {source}")]
    #[diagnostic(code(cs2hue::config), help("Check the config file at {path}"))]
    Config {
        path: String,
        #[source]
        source: ConfigError,
    },

    #[error("Orchestrator error: {0}")]
    #[diagnostic(code(cs2hue::core))]
    Core(CoreError),

    // ── IO ───────────────────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not render JSON: {0}")]
    #[diagnostic(code(cs2hue::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::AuthFailed | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NoLights { .. } | Self::Validation { .. } => exit_code::USAGE,
            Self::StreamingActive { .. } | Self::AlreadyExists { .. } => exit_code::CONFLICT,
            _ => exit_code::GENERAL,
        }
    }

    /// Attach the config file path to a [`ConfigError`].
    pub fn config(path: &std::path::Path, err: ConfigError) -> Self {
        let path = path.display().to_string();
        match err {
            ConfigError::NoCredentials => Self::NoCredentials { path },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            source => Self::Config { path, source },
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Unreachable { target, reason } => Self::ConnectionFailed { target, reason },
            CoreError::Timeout { timeout_ms } => Self::Timeout { timeout_ms },
            CoreError::StreamingActive { light } => Self::StreamingActive { light },
            CoreError::NoLights => Self::NoLights {
                path: cs2hue_config::config_path().display().to_string(),
            },
            CoreError::Io(e) => Self::Io(e),
            other => Self::Core(other),
        }
    }
}

// ── Bridge API error → CliError mapping ──────────────────────────────

impl From<cs2hue_api::Error> for CliError {
    fn from(err: cs2hue_api::Error) -> Self {
        if err.is_unauthorized() {
            return Self::AuthFailed;
        }
        match err {
            cs2hue_api::Error::Timeout { timeout_ms } => Self::Timeout { timeout_ms },
            cs2hue_api::Error::Transport(e) => Self::ConnectionFailed {
                target: e
                    .url()
                    .map_or_else(|| "(unknown)".into(), ToString::to_string),
                reason: e.to_string(),
            },
            other => Self::Bridge {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let err = CliError::from(CoreError::Timeout { timeout_ms: 2000 });
        assert_eq!(err.exit_code(), exit_code::TIMEOUT);

        let err = CliError::from(CoreError::StreamingActive { light: "3".into() });
        assert_eq!(err.exit_code(), exit_code::CONFLICT);

        let err = CliError::from(CoreError::NoLights);
        assert_eq!(err.exit_code(), exit_code::USAGE);

        let err = CliError::from(CoreError::Internal("boom".into()));
        assert_eq!(err.exit_code(), exit_code::GENERAL);
    }

    #[test]
    fn missing_credentials_point_at_the_config_file() {
        let err = CliError::config(
            std::path::Path::new("/tmp/cs2hue/config.toml"),
            ConfigError::NoCredentials,
        );
        assert_eq!(err.exit_code(), exit_code::AUTH);
        assert!(matches!(err, CliError::NoCredentials { ref path } if path.ends_with("config.toml")));
    }
}
