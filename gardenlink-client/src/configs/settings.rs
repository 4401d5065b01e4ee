use std::env;

use config::{Config, ConfigError, Environment, File, FileFormat};
use gardenlink_api::Channel;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Api {
    /// Backend host without scheme, e.g. `api.example.com` or `127.0.0.1:8080`
    pub host: String,
    /// Use `https`/`wss` instead of `http`/`ws`
    #[serde(default = "default_secure")]
    pub secure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crypto {
    pub secret: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    pub backoff: BackoffKind,
    /// Fixed delay, or the first delay for exponential backoff
    pub delay_ms: u64,
    /// Upper bound for exponential backoff
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Views {
    /// Readings kept per power meter
    pub pzem_history: usize,
    /// Audit log entries kept
    pub log_history: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guard {
    /// Path prefixes checked on navigation
    pub matcher: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logger {
    pub level: String,
}

impl Logger {
    /// Default filter directive covering the library and the binary named `bin`.
    pub fn directive(&self, bin: &str) -> String {
        let level = self.level.as_str();
        let app_name = env!("CARGO_PKG_NAME").replace('-', "_");

        format!("{app_name}={level},{bin}={level}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub token: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub channels: Vec<Channel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub api: Api,
    pub crypto: Crypto,
    pub stream: Stream,
    pub views: Views,
    pub guard: Guard,
    pub logger: Logger,
    pub monitor: Monitor,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or("development".into());

        Self::builder()?
            .add_source(File::with_name("configs/default").required(false))
            .add_source(File::with_name(&format!("configs/{run_mode}")).required(false))
            .add_source(Environment::with_prefix("GARDENLINK").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Loads settings from an inline TOML document layered over the defaults.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("api.host", "localhost:8080")?
            .set_default("api.secure", false)?
            .set_default("stream.backoff", "fixed")?
            .set_default("stream.delay_ms", 5000)?
            .set_default("stream.max_delay_ms", 60000)?
            .set_default("views.pzem_history", 20)?
            .set_default("views.log_history", 50)?
            .set_default("guard.matcher", vec!["/dashboard", "/auth"])?
            .set_default("logger.level", "info")?
            .set_default("monitor.channels", vec!["output", "session_account"])
    }
}

fn default_secure() -> bool {
    true
}
