use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Audit entry pushed on the log channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    pub message: String,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
