use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LogEntryType {
    Mode,
    Action,
    Engagement,
    Note,
}

impl LogEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogEntryType::Mode => "mode",
            LogEntryType::Action => "action",
            LogEntryType::Engagement => "engagement",
            LogEntryType::Note => "note",
        }
    }
}

/// One line in the observation log stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: LogEntryType,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl LogEntry {
    pub fn new(
        kind: LogEntryType,
        name: impl Into<String>,
        value: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp,
            kind,
            name: name.into(),
            value,
        }
    }
}
