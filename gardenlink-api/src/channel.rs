use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Control message that ends the current session.
pub const INVALID_SESSION: &str = "Invalid session";

/// Push channels exposed by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Validity of the current session
    SessionId,
    /// Controllable outputs such as lights
    Output,
    /// Power meter telemetry
    Pzem,
    /// Sessions of the signed-in account
    SessionAccount,
    /// Audit log
    Logs,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::SessionId,
        Channel::Output,
        Channel::Pzem,
        Channel::SessionAccount,
        Channel::Logs,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Channel::SessionId => "/dataSessionId",
            Channel::Output => "/dataOutput",
            Channel::Pzem => "/pzem",
            Channel::SessionAccount => "/dataSessionAccount",
            Channel::Logs => "/logs",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|channel| channel.path() == path)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session_id" => Ok(Channel::SessionId),
            "output" => Ok(Channel::Output),
            "pzem" => Ok(Channel::Pzem),
            "session_account" => Ok(Channel::SessionAccount),
            "logs" => Ok(Channel::Logs),
            other => Channel::from_path(other).ok_or_else(|| format!("Unknown channel: {other}")),
        }
    }
}

/// Whether a plain (unencrypted) frame tells the client its session is gone.
pub fn is_invalid_session(value: &Value) -> bool {
    let text = match value {
        Value::String(text) => Some(text.as_str()),
        Value::Object(object) => object
            .get("message")
            .or_else(|| object.get("error"))
            .and_then(Value::as_str),
        _ => None,
    };

    text.is_some_and(|text| text.trim().eq_ignore_ascii_case(INVALID_SESSION))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_channel_paths() {
        for channel in Channel::ALL {
            assert_eq!(Channel::from_path(channel.path()), Some(channel));
        }
        assert_eq!("pzem".parse::<Channel>(), Ok(Channel::Pzem));
        assert_eq!("/dataOutput".parse::<Channel>(), Ok(Channel::Output));
        assert!("/unknown".parse::<Channel>().is_err());
    }

    #[test]
    fn test_invalid_session_detection() {
        assert!(is_invalid_session(&json!({"message": "Invalid session"})));
        assert!(is_invalid_session(&json!({"error": "invalid session "})));
        assert!(is_invalid_session(&json!("Invalid session")));
        assert!(!is_invalid_session(&json!({"message": "ok"})));
        assert!(!is_invalid_session(&json!([1])));
    }
}
