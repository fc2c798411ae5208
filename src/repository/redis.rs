//! Redis-backed hot store.
//!
//! Key layout:
//!   `stream:session:{key}`    JSON session record, sliding TTL
//!   `user:{id}:chatrooms`     set of room ids
//!   `user:{id}:online`        presence flag, 5 minute TTL
//!   `chatroom:{id}:messages`  ZSET of JSON messages scored by created_at

use crate::error::AppResult;
use crate::models::{ChatMessage, StreamSession};
use crate::repository::{HotStore, MESSAGE_CACHE_CAP};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

const PRESENCE_TTL_SECS: u64 = 300;

#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    pub async fn connect(url: &str) -> AppResult<Self> {
        let client = redis::Client::open(url)
            .map_err(crate::error::AppError::from)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self { manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }

    fn session_key(stream_key: &str) -> String {
        format!("stream:session:{stream_key}")
    }

    fn rooms_key(user_id: &str) -> String {
        format!("user:{user_id}:chatrooms")
    }

    fn online_key(user_id: &str) -> String {
        format!("user:{user_id}:online")
    }

    fn messages_key(room_id: &str) -> String {
        format!("chatroom:{room_id}:messages")
    }
}

#[async_trait]
impl HotStore for RedisStore {
    async fn session_put(
        &self,
        stream_key: &str,
        session: &StreamSession,
        ttl: Duration,
    ) -> AppResult<()> {
        let payload = serde_json::to_string(session)?;
        let mut conn = self.conn();
        conn.set_ex::<_, _, ()>(Self::session_key(stream_key), payload, ttl.as_secs())
            .await?;
        Ok(())
    }

    async fn session_get(&self, stream_key: &str) -> AppResult<Option<StreamSession>> {
        let mut conn = self.conn();
        let raw: Option<String> = conn.get(Self::session_key(stream_key)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn session_del(&self, stream_key: &str) -> AppResult<()> {
        let mut conn = self.conn();
        conn.del::<_, ()>(Self::session_key(stream_key)).await?;
        Ok(())
    }

    async fn room_set_add(&self, user_id: &str, room_id: &str) -> AppResult<()> {
        let mut conn = self.conn();
        conn.sadd::<_, _, ()>(Self::rooms_key(user_id), room_id).await?;
        Ok(())
    }

    async fn room_set_remove(&self, user_id: &str, room_id: &str) -> AppResult<()> {
        let mut conn = self.conn();
        conn.srem::<_, _, ()>(Self::rooms_key(user_id), room_id).await?;
        Ok(())
    }

    async fn room_set_members(&self, user_id: &str) -> AppResult<Vec<String>> {
        let mut conn = self.conn();
        Ok(conn.smembers(Self::rooms_key(user_id)).await?)
    }

    async fn presence_set_online(&self, user_id: &str) -> AppResult<()> {
        let mut conn = self.conn();
        conn.set_ex::<_, _, ()>(Self::online_key(user_id), "true", PRESENCE_TTL_SECS)
            .await?;
        Ok(())
    }

    async fn presence_set_offline(&self, user_id: &str) -> AppResult<()> {
        let mut conn = self.conn();
        conn.del::<_, ()>(Self::online_key(user_id)).await?;
        Ok(())
    }

    async fn presence_is_online(&self, user_id: &str) -> AppResult<bool> {
        let mut conn = self.conn();
        let value: Option<String> = conn.get(Self::online_key(user_id)).await?;
        Ok(value.as_deref() == Some("true"))
    }

    async fn cache_message(&self, message: &ChatMessage) -> AppResult<()> {
        let key = Self::messages_key(&message.chatroom_id);
        let payload = serde_json::to_string(message)?;
        let score = message.created_at.timestamp_millis();
        let mut conn = self.conn();
        conn.zadd::<_, _, _, ()>(&key, payload, score).await?;
        // Trim to the newest MESSAGE_CACHE_CAP entries.
        conn.zremrangebyrank::<_, ()>(&key, 0, -(MESSAGE_CACHE_CAP as isize) - 1)
            .await?;
        Ok(())
    }

    async fn cache_recent(&self, room_id: &str, limit: usize) -> AppResult<Vec<ChatMessage>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn();
        let raw: Vec<String> = conn
            .zrevrange(Self::messages_key(room_id), 0, limit as isize - 1)
            .await?;
        // Skip entries that fail to decode rather than failing the read.
        Ok(raw
            .iter()
            .filter_map(|m| serde_json::from_str(m).ok())
            .collect())
    }
}
