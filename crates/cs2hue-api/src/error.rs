use thiserror::Error;

/// Top-level error type for the `cs2hue-api` crate.
///
/// Covers every failure mode of the bridge REST surface: transport,
/// HTTP status, bridge-reported errors, and malformed payloads.
/// `cs2hue-core` maps these into orchestrator-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // ── Bridge ──────────────────────────────────────────────────────
    /// Non-success HTTP status from the bridge.
    #[error("Bridge returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Error entry reported inside a `[{"error": {...}}]` array.
    ///
    /// The bridge answers most failures with HTTP 200 and this envelope.
    #[error("Bridge error {kind} at {address}: {description}")]
    Bridge {
        kind: u16,
        address: String,
        description: String,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

/// Bridge error type 1: unauthorized user (bad or revoked API key).
const BRIDGE_UNAUTHORIZED: u16 = 1;
/// Bridge error type 3: resource not available.
const BRIDGE_RESOURCE_UNAVAILABLE: u16 = 3;

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns `true` if the bridge rejected the API key.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::Bridge { kind, .. } => *kind == BRIDGE_UNAUTHORIZED,
            Self::Http { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Http { status: 404, .. } => true,
            Self::Bridge { kind, .. } => *kind == BRIDGE_RESOURCE_UNAVAILABLE,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn bridge_error_classification() {
        let unauthorized = Error::Bridge {
            kind: 1,
            address: "/lights".into(),
            description: "unauthorized user".into(),
        };
        assert!(unauthorized.is_unauthorized());
        assert!(!unauthorized.is_transient());

        let missing = Error::Bridge {
            kind: 3,
            address: "/lights/9".into(),
            description: "resource, /lights/9, not available".into(),
        };
        assert!(missing.is_not_found());
    }

    #[test]
    fn server_errors_are_transient() {
        let err = Error::Http {
            status: 503,
            body: String::new(),
        };
        assert!(err.is_transient());
        assert!(!err.is_not_found());
    }
}
