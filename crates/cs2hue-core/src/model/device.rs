use std::fmt;

use serde::{Deserialize, Serialize};

/// Gateway-side identifier of a managed light (e.g. Hue light `"3"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LightId(String);

impl LightId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a comma-separated id list (`"1, 2,3"`), dropping blanks.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::new)
            .collect()
    }
}

impl fmt::Display for LightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LightId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for LightId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Observed device state as reported by the gateway.
///
/// Only used for verification and health checks; never the source of
/// truth for what the orchestrator intends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub on: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xy: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ct: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::LightId;

    #[test]
    fn parse_list_trims_and_drops_blanks() {
        let ids = LightId::parse_list(" 1, 2,,3 ,");
        let ids: Vec<&str> = ids.iter().map(LightId::as_str).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn parse_list_of_empty_string() {
        assert!(LightId::parse_list("  ").is_empty());
    }
}
