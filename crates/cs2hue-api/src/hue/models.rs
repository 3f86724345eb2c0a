// Wire models for the Hue bridge v1 REST API.
//
// Only the fields the orchestrator reads are typed; everything else is
// tolerated via `#[serde(default)]` so firmware additions never break parsing.

use serde::{Deserialize, Serialize};

/// A light as returned by `GET /lights/{id}` (and each entry of `GET /lights`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HueLight {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "modelid", default)]
    pub model_id: Option<String>,
    pub state: HueLightState,
    #[serde(default)]
    pub config: Option<HueLightConfig>,
}

impl HueLight {
    /// Whether the light is currently owned by an entertainment (sync) stream.
    ///
    /// Depending on firmware the marker lives in `config.mode` or `state.mode`.
    pub fn is_streaming(&self) -> bool {
        let is_stream = |mode: &str| mode == "stream" || mode == "streaming";
        self.config
            .as_ref()
            .and_then(|c| c.mode.as_deref())
            .is_some_and(is_stream)
            || self.state.mode.as_deref().is_some_and(is_stream)
    }
}

/// The `state` object of a light.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HueLightState {
    #[serde(default)]
    pub on: bool,
    #[serde(default)]
    pub bri: Option<u8>,
    #[serde(default)]
    pub xy: Option<[f64; 2]>,
    #[serde(default)]
    pub ct: Option<u16>,
    #[serde(rename = "colormode", default)]
    pub color_mode: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub reachable: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HueLightConfig {
    #[serde(default)]
    pub mode: Option<String>,
}

/// Body for `PUT /lights/{id}/state`. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LightStateBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xy: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ct: Option<u16>,
    /// Transition time in multiples of 100ms.
    #[serde(rename = "transitiontime", skip_serializing_if = "Option::is_none")]
    pub transition_time: Option<u16>,
}

impl LightStateBody {
    pub fn is_empty(&self) -> bool {
        self.on.is_none() && self.bri.is_none() && self.xy.is_none() && self.ct.is_none()
    }
}

/// One entry of the bridge's `[{"success": ...} | {"error": ...}]` reply.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeReply {
    Success(serde_json::Value),
    Error(BridgeErrorBody),
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeErrorBody {
    #[serde(rename = "type")]
    pub kind: u16,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub description: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{BridgeReply, HueLight, LightStateBody};

    #[test]
    fn parses_extended_color_light() {
        let light: HueLight = serde_json::from_value(json!({
            "state": {
                "on": true, "bri": 144, "hue": 7688, "sat": 199,
                "xy": [0.5058, 0.4151], "ct": 443, "alert": "none",
                "colormode": "xy", "mode": "homeautomation", "reachable": true
            },
            "type": "Extended color light",
            "name": "Desk",
            "modelid": "LCT015"
        }))
        .expect("valid light");

        assert!(light.state.on);
        assert_eq!(light.state.bri, Some(144));
        assert_eq!(light.state.xy, Some([0.5058, 0.4151]));
        assert!(!light.is_streaming());
    }

    #[test]
    fn detects_streaming_mode_in_config() {
        let light: HueLight = serde_json::from_value(json!({
            "state": { "on": true },
            "config": { "mode": "streaming" }
        }))
        .expect("valid light");
        assert!(light.is_streaming());
    }

    #[test]
    fn state_body_omits_absent_fields() {
        let body = LightStateBody {
            on: Some(true),
            bri: Some(20),
            ..LightStateBody::default()
        };
        assert_eq!(
            serde_json::to_value(&body).expect("serializable"),
            json!({ "on": true, "bri": 20 })
        );
    }

    #[test]
    fn parses_mixed_reply() {
        let replies: Vec<BridgeReply> = serde_json::from_value(json!([
            { "success": { "/lights/1/state/on": true } },
            { "error": { "type": 201, "address": "/lights/1/state/bri",
                         "description": "parameter, bri, is not modifiable. Device is set to off." } }
        ]))
        .expect("valid reply");
        assert!(matches!(replies[0], BridgeReply::Success(_)));
        assert!(matches!(replies[1], BridgeReply::Error(ref e) if e.kind == 201));
    }
}
