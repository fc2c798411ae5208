use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sliding TTL on the hot-store session record.
pub const SESSION_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPermissions {
    pub can_stream: bool,
    pub can_record: bool,
    pub max_bitrate: i32,
    pub max_duration_minutes: i32,
}

impl Default for StreamPermissions {
    fn default() -> Self {
        Self {
            can_stream: true,
            can_record: true,
            max_bitrate: 8000,
            max_duration_minutes: 240,
        }
    }
}

/// Binds a stream key to an authenticated identity for the duration of one
/// ingest. Lives only in the hot store; purged on stream end or by the reaper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSession {
    pub user_id: i64,
    pub username: String,
    pub stream_key: String,
    pub client_ip: String,
    pub app_name: String,
    pub started_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
    pub permissions: StreamPermissions,
}
