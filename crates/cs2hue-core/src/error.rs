// ── Core error types ──
//
// Orchestrator-level errors. Consumers never see HTTP status codes or
// bridge error envelopes directly: the `From<cs2hue_api::Error>` impl
// translates transport failures into these variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Device I/O ───────────────────────────────────────────────────
    #[error("Light gateway unreachable at {target}: {reason}")]
    Unreachable { target: String, reason: String },

    #[error("Device I/O timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Gateway rejected request: {message}")]
    Gateway {
        message: String,
        /// HTTP status or bridge error type, when known.
        code: Option<u16>,
    },

    // ── Preflight ────────────────────────────────────────────────────
    #[error("No lights configured")]
    NoLights,

    #[error("Light {light} is being streamed to by an entertainment area")]
    StreamingActive { light: String },

    // ── Scene / palette ──────────────────────────────────────────────
    #[error("Color '{key}' is disabled or missing")]
    ColorUnavailable { key: String },

    // ── Snapshot source ──────────────────────────────────────────────
    #[error("Game state unavailable: {message}")]
    Snapshot { message: String },

    // ── Configuration / filesystem ───────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ── Internal ─────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the failure is worth retrying on the next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unreachable { .. } | Self::Timeout { .. } | Self::Snapshot { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<cs2hue_api::Error> for CoreError {
    fn from(err: cs2hue_api::Error) -> Self {
        match err {
            cs2hue_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_ms: 0 }
                } else if e.is_connect() {
                    CoreError::Unreachable {
                        target: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), |u| u.origin().ascii_serialization()),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Gateway {
                        message: e.to_string(),
                        code: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            cs2hue_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid bridge URL: {e}"),
            },
            cs2hue_api::Error::Timeout { timeout_ms } => CoreError::Timeout { timeout_ms },
            cs2hue_api::Error::Http { status, body } => CoreError::Gateway {
                message: format!("HTTP {status}: {body}"),
                code: Some(status),
            },
            cs2hue_api::Error::Bridge {
                kind,
                address,
                description,
            } => CoreError::Gateway {
                message: format!("{description} ({address})"),
                code: Some(kind),
            },
            cs2hue_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
