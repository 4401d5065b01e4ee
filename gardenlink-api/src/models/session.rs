use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// A session counts as online while it was accessed within this window.
pub const ONLINE_WINDOW: Duration = Duration::seconds(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Online,
    Offline,
}

pub fn session_status(now: OffsetDateTime, last_accessed_at: OffsetDateTime) -> SessionStatus {
    if now - last_accessed_at < ONLINE_WINDOW {
        SessionStatus::Online
    } else {
        SessionStatus::Offline
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub org: String,
    #[serde(default)]
    pub timezone: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_accessed_at: OffsetDateTime,
}

impl SessionRecord {
    /// Derived on every call, never stored.
    pub fn status(&self, now: OffsetDateTime) -> SessionStatus {
        session_status(now, self.last_accessed_at)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    #[serde(default)]
    pub sessions: Vec<SessionRecord>,
    #[serde(default)]
    pub session_now: Option<String>,
}

/// Decrypted payload of the account session channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountPush {
    pub account: AccountSnapshot,
}
