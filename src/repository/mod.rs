use crate::error::AppResult;
use crate::models::{ChatMessage, Chatroom, Stream, StreamSession, StreamStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub mod dynamodb;
pub mod memory;
pub mod redis;

use crate::error::AppError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Number of messages retained in the per-room hot cache.
pub const MESSAGE_CACHE_CAP: usize = 100;

/// Pagination cursors are the sort position of the last message returned,
/// base64-wrapped so callers treat them as opaque.
pub fn encode_cursor(sort_key: &str) -> String {
    BASE64.encode(sort_key)
}

pub fn decode_cursor(cursor: &str) -> AppResult<String> {
    let bytes = BASE64
        .decode(cursor)
        .map_err(|_| AppError::InvalidArgument("malformed pagination cursor".into()))?;
    String::from_utf8(bytes)
        .map_err(|_| AppError::InvalidArgument("malformed pagination cursor".into()))
}

/// Durable stream records. `update_stream` is a conditional write guarded by
/// `updated_at`: a writer whose snapshot is older than the stored row loses.
#[async_trait]
pub trait StreamStore: Send + Sync {
    async fn put_stream(&self, stream: &Stream) -> AppResult<()>;
    async fn get_stream(&self, id: &str) -> AppResult<Option<Stream>>;
    async fn get_stream_by_key(&self, stream_key: &str) -> AppResult<Option<Stream>>;
    async fn list_streams_by_status(&self, status: StreamStatus) -> AppResult<Vec<Stream>>;
    async fn update_stream(
        &self,
        stream: &Stream,
        expected_updated_at: DateTime<Utc>,
    ) -> AppResult<()>;
}

/// Durable chatrooms and message log.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn put_chatroom(&self, room: &Chatroom) -> AppResult<()>;
    async fn get_chatroom(&self, id: &str) -> AppResult<Option<Chatroom>>;
    /// No-op when the user is already a member.
    async fn add_member(&self, room_id: &str, user_id: &str) -> AppResult<()>;
    /// Preserves the order of the remaining members.
    async fn remove_member(&self, room_id: &str, user_id: &str) -> AppResult<()>;
    async fn is_member(&self, room_id: &str, user_id: &str) -> AppResult<bool>;
    async fn list_rooms_for_user(&self, user_id: &str) -> AppResult<Vec<Chatroom>>;
    async fn put_message(&self, message: &ChatMessage) -> AppResult<()>;
    /// Chronological ascending, ties broken by id. The cursor is the opaque
    /// position of the last message returned; `None` means start from the top.
    async fn list_messages(
        &self,
        room_id: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> AppResult<(Vec<ChatMessage>, Option<String>)>;
}

/// Hot store for sessions, membership sets, presence, and recent messages.
/// Every failure here is recoverable; callers log and fall through to the
/// durable path.
#[async_trait]
pub trait HotStore: Send + Sync {
    async fn session_put(
        &self,
        stream_key: &str,
        session: &StreamSession,
        ttl: Duration,
    ) -> AppResult<()>;
    async fn session_get(&self, stream_key: &str) -> AppResult<Option<StreamSession>>;
    async fn session_del(&self, stream_key: &str) -> AppResult<()>;

    async fn room_set_add(&self, user_id: &str, room_id: &str) -> AppResult<()>;
    async fn room_set_remove(&self, user_id: &str, room_id: &str) -> AppResult<()>;
    async fn room_set_members(&self, user_id: &str) -> AppResult<Vec<String>>;

    async fn presence_set_online(&self, user_id: &str) -> AppResult<()>;
    async fn presence_set_offline(&self, user_id: &str) -> AppResult<()>;
    async fn presence_is_online(&self, user_id: &str) -> AppResult<bool>;

    /// Appends to the bounded per-room ring; the oldest entries beyond
    /// [`MESSAGE_CACHE_CAP`] are evicted.
    async fn cache_message(&self, message: &ChatMessage) -> AppResult<()>;
    /// Up to `limit` most recent messages, newest first.
    async fn cache_recent(&self, room_id: &str, limit: usize) -> AppResult<Vec<ChatMessage>>;
}
