// ── Intent ──
//
// The desired observable device state. A value type: two intents are the
// same write iff their stable serialization is identical.

use serde::{Deserialize, Serialize};

use super::device::DeviceState;
use super::palette::ColorTemplate;

/// Lowest brightness a device accepts while on.
pub const MIN_BRI: u8 = 1;
/// Highest brightness a device accepts.
pub const MAX_BRI: u8 = 254;

/// Clamp an arbitrary brightness into the device range.
pub fn clamp_bri(value: i64) -> u8 {
    // Bounded by MAX_BRI, so the narrowing is lossless.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let clamped = value.clamp(i64::from(MIN_BRI), i64::from(MAX_BRI)) as u8;
    clamped
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xy: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ct: Option<u16>,
    /// Transport hint: prefer color temperature over xy.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub use_ct: bool,
}

/// Numeric slack when comparing an intent against a device readback.
///
/// Device protocols round brightness and chromaticity, so exact equality
/// would report false mismatches after every write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub bri: u8,
    pub xy: f64,
    pub ct: u16,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            bri: 2,
            xy: 0.002,
            ct: 2,
        }
    }
}

impl Intent {
    pub fn power(on: bool) -> Self {
        Self {
            on: Some(on),
            ..Self::default()
        }
    }

    pub fn off() -> Self {
        Self::power(false)
    }

    /// `{on: true, bri}`.
    pub fn on_at(bri: u8) -> Self {
        Self {
            on: Some(true),
            bri: Some(bri),
            ..Self::default()
        }
    }

    /// Build the intent for a color template.
    ///
    /// Templates flagged `use_ct` with a `ct` value are sent as color
    /// temperature; otherwise xy is used when both coordinates exist.
    /// `ct_hint` forwards `use_ct` to transports that care about it.
    pub fn from_template(template: &ColorTemplate, ct_hint: bool) -> Self {
        let mut intent = Self::power(template.on);
        match (template.use_ct, template.ct, template.x, template.y) {
            (true, Some(ct), _, _) => {
                intent.ct = Some(ct);
                intent.use_ct = ct_hint;
            }
            (_, _, Some(x), Some(y)) => intent.xy = Some([x, y]),
            (_, Some(ct), _, _) => intent.ct = Some(ct),
            _ => {}
        }
        intent.bri = template.bri.map(|b| clamp_bri(i64::from(b)));
        intent
    }

    pub fn requests_off(&self) -> bool {
        self.on == Some(false)
    }

    /// Stable serialization used as the dedup key.
    pub fn stable_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }

    /// Tolerant comparison against an observed state.
    ///
    /// `on` must match exactly. Numeric fields are only compared when both
    /// sides carry them; an off intent ignores everything but `on`.
    pub fn matches(&self, state: &DeviceState, tol: &Tolerance) -> bool {
        if let Some(on) = self.on {
            if state.on != on {
                return false;
            }
            if !on {
                return true;
            }
        }
        if let (Some(want), Some(got)) = (self.bri, state.bri) {
            if want.abs_diff(got) > tol.bri {
                return false;
            }
        }
        if let (Some(want), Some(got)) = (self.xy, state.xy) {
            if (want[0] - got[0]).abs() > tol.xy || (want[1] - got[1]).abs() > tol.xy {
                return false;
            }
        }
        if let (Some(want), Some(got)) = (self.ct, state.ct) {
            if self.xy.is_none() && want.abs_diff(got) > tol.ct {
                return false;
            }
        }
        true
    }
}

impl From<&DeviceState> for Intent {
    /// Intent that restores a recorded state.
    fn from(state: &DeviceState) -> Self {
        if !state.on {
            return Self::off();
        }
        Self {
            on: Some(true),
            bri: state.bri,
            xy: state.xy,
            ct: if state.xy.is_some() { None } else { state.ct },
            use_ct: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{Intent, Tolerance, clamp_bri};
    use crate::model::device::DeviceState;
    use crate::model::palette::ColorTemplate;

    fn template(bri: u16, x: f64, y: f64) -> ColorTemplate {
        ColorTemplate {
            bri: Some(bri),
            x: Some(x),
            y: Some(y),
            ..ColorTemplate::default()
        }
    }

    #[test]
    fn template_prefers_xy() {
        let intent = Intent::from_template(&template(20, 0.1553, 0.1284), false);
        assert_eq!(
            intent,
            Intent {
                on: Some(true),
                bri: Some(20),
                xy: Some([0.1553, 0.1284]),
                ..Intent::default()
            }
        );
    }

    #[test]
    fn template_with_use_ct_sends_temperature() {
        let t = ColorTemplate {
            ct: Some(318),
            use_ct: true,
            ..template(100, 0.5, 0.5)
        };
        let intent = Intent::from_template(&t, true);
        assert_eq!(intent.ct, Some(318));
        assert_eq!(intent.xy, None);
        assert!(intent.use_ct);
    }

    #[test]
    fn template_brightness_is_clamped() {
        let intent = Intent::from_template(&template(400, 0.3, 0.3), false);
        assert_eq!(intent.bri, Some(254));
        assert_eq!(clamp_bri(0), 1);
    }

    #[test]
    fn stable_key_distinguishes_values() {
        let a = Intent::on_at(20);
        let b = Intent::on_at(21);
        assert_eq!(a.stable_key(), Intent::on_at(20).stable_key());
        assert_ne!(a.stable_key(), b.stable_key());
        assert_eq!(Intent::off().stable_key(), r#"{"on":false}"#);
    }

    #[test]
    fn tolerant_match_within_epsilon() {
        let intent = Intent::from_template(&template(100, 0.3227, 0.329), false);
        let observed = DeviceState {
            on: true,
            bri: Some(99),
            xy: Some([0.3235, 0.3283]),
            ct: Some(153),
        };
        assert!(intent.matches(&observed, &Tolerance::default()));
    }

    #[test]
    fn tolerant_match_rejects_drift() {
        let intent = Intent::from_template(&template(100, 0.3227, 0.329), false);
        let dim = DeviceState {
            on: true,
            bri: Some(90),
            xy: Some([0.3227, 0.329]),
            ct: None,
        };
        let shifted = DeviceState {
            on: true,
            bri: Some(100),
            xy: Some([0.33, 0.329]),
            ct: None,
        };
        let off = DeviceState {
            on: false,
            ..dim.clone()
        };
        let tol = Tolerance::default();
        assert!(!intent.matches(&dim, &tol));
        assert!(!intent.matches(&shifted, &tol));
        assert!(!intent.matches(&off, &tol));
    }

    #[test]
    fn off_intent_only_compares_power() {
        let observed = DeviceState {
            on: false,
            bri: Some(3),
            xy: None,
            ct: None,
        };
        assert!(Intent::off().matches(&observed, &Tolerance::default()));
    }

    #[test]
    fn restore_intent_from_state() {
        let state = DeviceState {
            on: true,
            bri: Some(180),
            xy: None,
            ct: Some(366),
        };
        let intent = Intent::from(&state);
        assert_eq!(intent.ct, Some(366));
        assert_eq!(intent.bri, Some(180));
        assert_eq!(Intent::from(&DeviceState::default()), Intent::off());
    }
}
