// Hue bridge v1 REST surface.

pub mod client;
pub mod models;

pub use client::HueClient;
pub use models::{HueLight, HueLightConfig, HueLightState, LightStateBody};
