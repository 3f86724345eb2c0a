// cs2hue-api: Async Rust client for the Philips Hue bridge REST API

pub mod error;
pub mod hue;
pub mod transport;

pub use error::Error;
pub use hue::{HueClient, HueLight, HueLightState, LightStateBody};
pub use transport::TransportConfig;
