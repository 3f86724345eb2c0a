// ── Light gateway ──
//
// Uniform device capability the orchestrator drives, independent of the
// transport behind it. The Hue bridge adapter lives here; other device
// families plug in by implementing `LightGateway`.

use std::time::Duration;

use async_trait::async_trait;
use cs2hue_api::{HueClient, LightStateBody};
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::{DeviceState, Intent, LightId};

/// Minimum spacing between writes to one Hue light.
const HUE_WRITE_SPACING: Duration = Duration::from_millis(100);

#[async_trait]
pub trait LightGateway: Send + Sync + 'static {
    /// Short name for logs (`"hue"`).
    fn name(&self) -> &'static str;

    async fn get_state(&self, id: &LightId) -> Result<DeviceState, CoreError>;

    async fn set_state(&self, id: &LightId, intent: &Intent) -> Result<(), CoreError>;

    /// Minimum spacing between non-forced writes to the same light.
    fn write_spacing(&self) -> Duration {
        HUE_WRITE_SPACING
    }

    /// Whether templates flagged `useCt` should forward the hint in intents.
    fn wants_ct_hint(&self) -> bool {
        false
    }

    /// Checks run once before the orchestrator starts driving `lights`.
    async fn preflight(&self, _lights: &[LightId]) -> Result<(), CoreError> {
        Ok(())
    }
}

// ── Hue ──────────────────────────────────────────────────────────────

/// [`LightGateway`] over the Hue bridge v1 REST API.
#[derive(Debug, Clone)]
pub struct HueGateway {
    client: HueClient,
}

impl HueGateway {
    pub fn new(client: HueClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &HueClient {
        &self.client
    }
}

#[async_trait]
impl LightGateway for HueGateway {
    fn name(&self) -> &'static str {
        "hue"
    }

    async fn get_state(&self, id: &LightId) -> Result<DeviceState, CoreError> {
        let light = self.client.get_light(id.as_str()).await?;
        Ok(DeviceState::from(&light.state))
    }

    async fn set_state(&self, id: &LightId, intent: &Intent) -> Result<(), CoreError> {
        let body = LightStateBody::from(intent);
        self.client.set_light_state(id.as_str(), &body).await?;
        Ok(())
    }

    async fn preflight(&self, lights: &[LightId]) -> Result<(), CoreError> {
        let bridge = self.client.bridge_url().to_string();
        info!(bridge = %bridge, "connecting to Hue bridge");

        self.client
            .ping()
            .await
            .map_err(|e| CoreError::Unreachable {
                target: bridge.clone(),
                reason: e.to_string(),
            })?;

        let known = self.client.list_lights().await?;
        debug!(count = known.len(), "bridge lights listed");

        for id in lights {
            match self.client.get_light(id.as_str()).await {
                Ok(light) if light.is_streaming() => {
                    return Err(CoreError::StreamingActive {
                        light: id.to_string(),
                    });
                }
                Ok(_) => {}
                Err(e) => warn!(light = %id, error = %e, "could not inspect light"),
            }
        }
        Ok(())
    }
}
