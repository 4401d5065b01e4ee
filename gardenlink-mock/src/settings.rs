use std::error::Error;

use gardenlink_api::models::{OutputMode, Role};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logger {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crypto {
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedUser {
    pub id: String,
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedOutput {
    pub id: String,
    pub name: String,
    /// Missing means the device never reported a state
    pub state: Option<bool>,
    pub mode: OutputMode,
    pub turn_on_time: Option<String>,
    pub turn_off_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedMeter {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mock {
    /// Seconds between simulated readings
    pub tick_secs: u64,
    pub token_ttl_secs: i64,
    /// `AUTO_SUN` outputs switch on below this light level
    pub sun_threshold_lux: f64,
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub outputs: Vec<SeedOutput>,
    #[serde(default)]
    pub meters: Vec<SeedMeter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub logger: Logger,
    pub server: Server,
    pub crypto: Crypto,
    pub mock: Mock,
}

impl Settings {
    pub fn new() -> Result<Self, Box<dyn Error>> {
        Ok(toml::from_str(include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../",
            "configs/default.toml"
        )))?)
    }
}
