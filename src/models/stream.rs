use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Pending,
    Live,
    Ended,
    Error,
}

impl StreamStatus {
    /// Position in the lifecycle. Transitions may only increase it.
    pub fn rank(self) -> u8 {
        match self {
            StreamStatus::Pending => 0,
            StreamStatus::Live => 1,
            StreamStatus::Ended => 2,
            StreamStatus::Error => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, StreamStatus::Ended | StreamStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamStatus::Pending => "pending",
            StreamStatus::Live => "live",
            StreamStatus::Ended => "ended",
            StreamStatus::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(StreamStatus::Pending),
            "live" => Some(StreamStatus::Live),
            "ended" => Some(StreamStatus::Ended),
            "error" => Some(StreamStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One live ingest session. Created on the first authenticated `started`
/// callback, mutated only by the lifecycle controller, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    pub id: String,
    pub user_id: i64,
    pub stream_key: String,
    pub title: String,
    pub status: StreamStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: i64,
    pub viewer_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_url: Option<String>,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Stream {
    pub fn generate_id() -> String {
        format!("stream_{}", uuid::Uuid::new_v4().simple())
    }
}
