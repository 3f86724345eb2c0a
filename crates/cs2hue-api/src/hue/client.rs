// Hue bridge HTTP client
//
// Wraps `reqwest::Client` with bridge URL construction and the bridge's
// `[{"success"}|{"error"}]` reply envelope. The API key is part of the
// path (`/api/<key>/...`), so every URL is built from `api_base`.

use std::collections::BTreeMap;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use super::models::{BridgeReply, HueLight, LightStateBody};
use crate::error::Error;
use crate::transport::TransportConfig;

/// Raw HTTP client for a single Hue bridge.
#[derive(Clone)]
pub struct HueClient {
    http: reqwest::Client,
    bridge_url: Url,
    api_base: Url,
}

impl std::fmt::Debug for HueClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // api_base embeds the key; keep it out of logs.
        f.debug_struct("HueClient")
            .field("bridge_url", &self.bridge_url.as_str())
            .finish_non_exhaustive()
    }
}

impl HueClient {
    /// Create a client for the bridge at `bridge` (an IP, host, or full URL).
    pub fn new(
        bridge: &str,
        api_key: &SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Self::with_client(http, bridge, api_key)
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        bridge: &str,
        api_key: &SecretString,
    ) -> Result<Self, Error> {
        let bridge_url = normalize_bridge_url(bridge)?;
        let api_base = bridge_url.join(&format!("api/{}/", api_key.expose_secret()))?;
        Ok(Self {
            http,
            bridge_url,
            api_base,
        })
    }

    /// The bridge root URL (without the API key).
    pub fn bridge_url(&self) -> &Url {
        &self.bridge_url
    }

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.api_base.join(path)?)
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!(path, "GET");

        let resp = self.http.get(url).send().await?;
        let body = Self::read_body(resp).await?;
        Self::check_error_array(&body)?;
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    async fn put<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<(), Error> {
        let url = self.url(path)?;
        debug!(path, "PUT");

        let resp = self.http.put(url).json(body).send().await?;
        let text = Self::read_body(resp).await?;
        Self::check_error_array(&text)
    }

    async fn read_body(resp: reqwest::Response) -> Result<String, Error> {
        let status = resp.status();
        let body = resp.text().await?;
        trace!(status = status.as_u16(), len = body.len(), "bridge response");
        if status.is_success() {
            Ok(body)
        } else {
            Err(Error::Http {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// Surface the first `{"error": ...}` entry of a reply array, if any.
    ///
    /// Object-shaped bodies (e.g. `GET /lights/1`) pass through untouched.
    fn check_error_array(body: &str) -> Result<(), Error> {
        if !body.trim_start().starts_with('[') {
            return Ok(());
        }
        let Ok(replies) = serde_json::from_str::<Vec<BridgeReply>>(body) else {
            return Ok(());
        };
        replies
            .into_iter()
            .find_map(|r| match r {
                BridgeReply::Error(e) => Some(Error::Bridge {
                    kind: e.kind,
                    address: e.address,
                    description: e.description,
                }),
                BridgeReply::Success(_) => None,
            })
            .map_or(Ok(()), Err)
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// Probe the bridge root. Any HTTP answer counts as reachable.
    pub async fn ping(&self) -> Result<(), Error> {
        debug!(url = %self.bridge_url, "HEAD");
        self.http.head(self.bridge_url.clone()).send().await?;
        Ok(())
    }

    /// List all lights known to the bridge, keyed by light id.
    pub async fn list_lights(&self) -> Result<BTreeMap<String, HueLight>, Error> {
        self.get("lights").await
    }

    /// Fetch a single light.
    pub async fn get_light(&self, id: &str) -> Result<HueLight, Error> {
        self.get(&format!("lights/{id}")).await
    }

    /// Apply a state change to a single light.
    pub async fn set_light_state(&self, id: &str, body: &LightStateBody) -> Result<(), Error> {
        if body.is_empty() && body.transition_time.is_none() {
            return Ok(());
        }
        self.put(&format!("lights/{id}/state"), body).await
    }
}

/// Accept `192.168.1.2`, `bridge.local:8080` or a full `http://` URL and
/// return a root URL ending in `/`.
fn normalize_bridge_url(raw: &str) -> Result<Url, Error> {
    let raw = raw.trim();
    let with_scheme = if raw.contains("://") {
        raw.to_owned()
    } else {
        format!("http://{raw}")
    };
    let mut url = Url::parse(&with_scheme)?;
    let path = url.path().trim_end_matches('/').to_owned();
    url.set_path(&format!("{path}/"));
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::normalize_bridge_url;

    #[test]
    fn bare_ip_gets_http_scheme() {
        let url = normalize_bridge_url("192.168.1.20").expect("valid");
        assert_eq!(url.as_str(), "http://192.168.1.20/");
    }

    #[test]
    fn full_url_is_kept() {
        let url = normalize_bridge_url("https://bridge.local:8443").expect("valid");
        assert_eq!(url.as_str(), "https://bridge.local:8443/");
    }
}
