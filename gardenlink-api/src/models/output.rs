use std::fmt;

use serde::{Deserialize, Serialize};

/// UI-level representation of a nullable boolean device flag.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutputState {
    On,
    Off,
    #[default]
    Unknown,
}

impl OutputState {
    pub fn from_api(state: Option<bool>) -> Self {
        match state {
            Some(true) => OutputState::On,
            Some(false) => OutputState::Off,
            None => OutputState::Unknown,
        }
    }

    /// Left inverse of [`OutputState::from_api`] on `On`/`Off`.
    pub fn to_api(self) -> Option<bool> {
        match self {
            OutputState::On => Some(true),
            OutputState::Off => Some(false),
            OutputState::Unknown => None,
        }
    }

    pub fn toggled(self) -> Option<bool> {
        self.to_api().map(|state| !state)
    }
}

impl fmt::Display for OutputState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputState::On => write!(f, "ON"),
            OutputState::Off => write!(f, "OFF"),
            OutputState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutputMode {
    /// Switched by hand only
    #[default]
    Manual,
    /// Follows sunrise and sunset
    AutoSun,
    /// Follows `turnOnTime` and `turnOffTime`
    AutoDatetime,
}

impl OutputMode {
    pub const ALL: [OutputMode; 3] = [OutputMode::Manual, OutputMode::AutoSun, OutputMode::AutoDatetime];

    /// Unknown or missing modes fall back to the first mode.
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value {
            Some("AUTO_SUN") => OutputMode::AutoSun,
            Some("AUTO_DATETIME") => OutputMode::AutoDatetime,
            _ => OutputMode::ALL[0],
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Manual => write!(f, "MANUAL"),
            OutputMode::AutoSun => write!(f, "AUTO_SUN"),
            OutputMode::AutoDatetime => write!(f, "AUTO_DATETIME"),
        }
    }
}

/// Authoritative state of one controllable output such as a light.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    pub id: String,
    pub name: String,
    pub state: OutputState,
    pub mode: OutputMode,
    /// Local `HH:mm`, no zone conversion
    pub turn_on_time: Option<String>,
    pub turn_off_time: Option<String>,
    pub state_id: Option<String>,
    pub state_created_at: Option<String>,
}

/// Body of `PUT /api/device/output/:id`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutputRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<OutputMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_on_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_off_time: Option<String>,
}
