// ── API-to-domain type conversions ──
//
// Bridges raw `cs2hue_api` wire types into canonical domain types and
// back. Keeps the gateway adapter free of field-by-field mapping.

use cs2hue_api::{HueLightState, LightStateBody};

use crate::model::{DeviceState, Intent};

impl From<&HueLightState> for DeviceState {
    fn from(s: &HueLightState) -> Self {
        Self {
            on: s.on,
            bri: s.bri,
            xy: s.xy,
            ct: s.ct,
        }
    }
}

impl From<&Intent> for LightStateBody {
    fn from(intent: &Intent) -> Self {
        // Hue applies whichever of xy/ct arrives last; never send both.
        let (xy, ct) = match (intent.xy, intent.ct) {
            (Some(_), Some(ct)) if intent.use_ct => (None, Some(ct)),
            (Some(xy), _) => (Some(xy), None),
            (None, ct) => (None, ct),
        };
        Self {
            on: intent.on,
            bri: intent.bri,
            xy,
            ct,
            transition_time: None,
        }
    }
}
