//! In-memory store implementations.
//!
//! Behaviorally equivalent to the DynamoDB/Redis stores (ordering, cursor,
//! conditional-write and cache-cap semantics) so service logic can be
//! exercised by tests without live backends.

use crate::error::{AppError, AppResult};
use crate::models::{ChatMessage, Chatroom, Stream, StreamSession, StreamStatus};
use crate::repository::{
    decode_cursor, encode_cursor, ChatStore, HotStore, StreamStore, MESSAGE_CACHE_CAP,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct MemoryStreamStore {
    streams: Mutex<HashMap<String, Stream>>,
}

impl MemoryStreamStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StreamStore for MemoryStreamStore {
    async fn put_stream(&self, stream: &Stream) -> AppResult<()> {
        self.streams
            .lock()
            .unwrap()
            .insert(stream.id.clone(), stream.clone());
        Ok(())
    }

    async fn get_stream(&self, id: &str) -> AppResult<Option<Stream>> {
        Ok(self.streams.lock().unwrap().get(id).cloned())
    }

    async fn get_stream_by_key(&self, stream_key: &str) -> AppResult<Option<Stream>> {
        Ok(self
            .streams
            .lock()
            .unwrap()
            .values()
            .find(|s| s.stream_key == stream_key)
            .cloned())
    }

    async fn list_streams_by_status(&self, status: StreamStatus) -> AppResult<Vec<Stream>> {
        Ok(self
            .streams
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect())
    }

    async fn update_stream(
        &self,
        stream: &Stream,
        expected_updated_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut streams = self.streams.lock().unwrap();
        let current = streams
            .get(&stream.id)
            .ok_or_else(|| AppError::NotFound(format!("stream {}", stream.id)))?;
        if current.updated_at != expected_updated_at {
            return Err(AppError::FailedPrecondition(format!(
                "stream {} was modified concurrently",
                stream.id
            )));
        }
        streams.insert(stream.id.clone(), stream.clone());
        Ok(())
    }
}

#[derive(Default)]
struct ChatInner {
    rooms: HashMap<String, Chatroom>,
    // (room_id, sort_key) -> message, matching the durable index layout.
    messages: BTreeMap<(String, String), ChatMessage>,
}

#[derive(Default)]
pub struct MemoryChatStore {
    inner: Mutex<ChatInner>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn put_chatroom(&self, room: &Chatroom) -> AppResult<()> {
        self.inner
            .lock()
            .unwrap()
            .rooms
            .insert(room.id.clone(), room.clone());
        Ok(())
    }

    async fn get_chatroom(&self, id: &str) -> AppResult<Option<Chatroom>> {
        Ok(self.inner.lock().unwrap().rooms.get(id).cloned())
    }

    async fn add_member(&self, room_id: &str, user_id: &str) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let room = inner
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| AppError::NotFound(format!("chatroom {room_id}")))?;
        if !room.has_member(user_id) {
            room.member_ids.push(user_id.to_string());
            room.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn remove_member(&self, room_id: &str, user_id: &str) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let room = inner
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| AppError::NotFound(format!("chatroom {room_id}")))?;
        room.member_ids.retain(|m| m != user_id);
        room.updated_at = Utc::now();
        Ok(())
    }

    async fn is_member(&self, room_id: &str, user_id: &str) -> AppResult<bool> {
        let inner = self.inner.lock().unwrap();
        let room = inner
            .rooms
            .get(room_id)
            .ok_or_else(|| AppError::NotFound(format!("chatroom {room_id}")))?;
        Ok(room.has_member(user_id))
    }

    async fn list_rooms_for_user(&self, user_id: &str) -> AppResult<Vec<Chatroom>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rooms
            .values()
            .filter(|r| r.has_member(user_id))
            .cloned()
            .collect())
    }

    async fn put_message(&self, message: &ChatMessage) -> AppResult<()> {
        self.inner.lock().unwrap().messages.insert(
            (message.chatroom_id.clone(), message.sort_key()),
            message.clone(),
        );
        Ok(())
    }

    async fn list_messages(
        &self,
        room_id: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> AppResult<(Vec<ChatMessage>, Option<String>)> {
        let after = cursor.map(decode_cursor).transpose()?;
        let inner = self.inner.lock().unwrap();
        let messages: Vec<ChatMessage> = inner
            .messages
            .range((room_id.to_string(), String::new())..)
            .take_while(|((room, _), _)| room == room_id)
            .filter(|((_, sort_key), _)| match &after {
                Some(after) => sort_key.as_str() > after.as_str(),
                None => true,
            })
            .take(limit)
            .map(|(_, m)| m.clone())
            .collect();

        let next_cursor = if messages.len() == limit {
            messages.last().map(|m| encode_cursor(&m.sort_key()))
        } else {
            None
        };
        Ok((messages, next_cursor))
    }
}

#[derive(Default)]
struct HotInner {
    sessions: HashMap<String, StreamSession>,
    room_sets: HashMap<String, HashSet<String>>,
    online: HashSet<String>,
    messages: HashMap<String, Vec<ChatMessage>>,
}

#[derive(Default)]
pub struct MemoryHotStore {
    inner: Mutex<HotInner>,
}

impl MemoryHotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HotStore for MemoryHotStore {
    async fn session_put(
        &self,
        stream_key: &str,
        session: &StreamSession,
        _ttl: Duration,
    ) -> AppResult<()> {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .insert(stream_key.to_string(), session.clone());
        Ok(())
    }

    async fn session_get(&self, stream_key: &str) -> AppResult<Option<StreamSession>> {
        Ok(self.inner.lock().unwrap().sessions.get(stream_key).cloned())
    }

    async fn session_del(&self, stream_key: &str) -> AppResult<()> {
        self.inner.lock().unwrap().sessions.remove(stream_key);
        Ok(())
    }

    async fn room_set_add(&self, user_id: &str, room_id: &str) -> AppResult<()> {
        self.inner
            .lock()
            .unwrap()
            .room_sets
            .entry(user_id.to_string())
            .or_default()
            .insert(room_id.to_string());
        Ok(())
    }

    async fn room_set_remove(&self, user_id: &str, room_id: &str) -> AppResult<()> {
        if let Some(set) = self.inner.lock().unwrap().room_sets.get_mut(user_id) {
            set.remove(room_id);
        }
        Ok(())
    }

    async fn room_set_members(&self, user_id: &str) -> AppResult<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .room_sets
            .get(user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn presence_set_online(&self, user_id: &str) -> AppResult<()> {
        self.inner.lock().unwrap().online.insert(user_id.to_string());
        Ok(())
    }

    async fn presence_set_offline(&self, user_id: &str) -> AppResult<()> {
        self.inner.lock().unwrap().online.remove(user_id);
        Ok(())
    }

    async fn presence_is_online(&self, user_id: &str) -> AppResult<bool> {
        Ok(self.inner.lock().unwrap().online.contains(user_id))
    }

    async fn cache_message(&self, message: &ChatMessage) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let ring = inner
            .messages
            .entry(message.chatroom_id.clone())
            .or_default();
        ring.push(message.clone());
        ring.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        if ring.len() > MESSAGE_CACHE_CAP {
            let excess = ring.len() - MESSAGE_CACHE_CAP;
            ring.drain(..excess);
        }
        Ok(())
    }

    async fn cache_recent(&self, room_id: &str, limit: usize) -> AppResult<Vec<ChatMessage>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .messages
            .get(room_id)
            .map(|ring| ring.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
