//! Shared fixtures: an in-memory service stack and a stubbed user directory.

#![allow(dead_code)]

use async_trait::async_trait;
use interaction_service::error::AppResult;
use interaction_service::models::StreamPermissions;
use interaction_service::repository::memory::{
    MemoryChatStore, MemoryHotStore, MemoryStreamStore,
};
use interaction_service::services::events::EventSink;
use interaction_service::services::user_client::{KeyValidation, UserDirectory, UserProfile};
use interaction_service::services::{ChatService, RecordingStore, StreamService};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct StubDirectory {
    keys: HashMap<String, (i64, String)>,
    users: HashMap<String, String>,
}

impl StubDirectory {
    pub fn new() -> Self {
        Self {
            keys: HashMap::new(),
            users: HashMap::new(),
        }
    }

    pub fn with_key(mut self, stream_key: &str, user_id: i64, username: &str) -> Self {
        self.keys
            .insert(stream_key.to_string(), (user_id, username.to_string()));
        self
    }

    pub fn with_user(mut self, user_id: &str, username: &str) -> Self {
        self.users
            .insert(user_id.to_string(), username.to_string());
        self
    }
}

#[async_trait]
impl UserDirectory for StubDirectory {
    async fn validate_stream_key(
        &self,
        stream_key: &str,
        _ip_address: &str,
        _app_name: &str,
    ) -> AppResult<KeyValidation> {
        Ok(match self.keys.get(stream_key) {
            Some((user_id, username)) => KeyValidation {
                valid: true,
                user_id: *user_id,
                username: username.clone(),
                permissions: StreamPermissions::default(),
            },
            None => KeyValidation::invalid(),
        })
    }

    async fn get_user(&self, user_id: &str) -> AppResult<Option<UserProfile>> {
        Ok(self.users.get(user_id).map(|username| UserProfile {
            id: user_id.to_string(),
            username: username.clone(),
        }))
    }
}

/// Event sink that records everything it is asked to publish.
#[derive(Default)]
pub struct CapturingEventSink {
    events: Mutex<Vec<Value>>,
}

impl CapturingEventSink {
    pub fn event_types(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| e["event_type"].as_str().map(str::to_string))
            .collect()
    }

    pub fn events(&self) -> Vec<Value> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for CapturingEventSink {
    async fn publish(&self, event: Value) -> AppResult<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

pub struct StreamFixture {
    pub service: Arc<StreamService>,
    pub store: Arc<MemoryStreamStore>,
    pub hot: Arc<MemoryHotStore>,
    pub events: Arc<CapturingEventSink>,
}

pub fn stream_fixture(directory: StubDirectory) -> StreamFixture {
    let store = Arc::new(MemoryStreamStore::new());
    let hot = Arc::new(MemoryHotStore::new());
    let events = Arc::new(CapturingEventSink::default());
    let service = Arc::new(StreamService::new(
        store.clone(),
        hot.clone(),
        events.clone(),
        Arc::new(directory),
        Arc::new(RecordingStore::mock("test-recordings")),
        Duration::from_secs(5),
    ));
    StreamFixture {
        service,
        store,
        hot,
        events,
    }
}

pub struct ChatFixture {
    pub service: Arc<ChatService>,
    pub store: Arc<MemoryChatStore>,
    pub hot: Arc<MemoryHotStore>,
}

pub fn chat_fixture(directory: StubDirectory) -> ChatFixture {
    let store = Arc::new(MemoryChatStore::new());
    let hot = Arc::new(MemoryHotStore::new());
    let service = Arc::new(ChatService::new(
        store.clone(),
        hot.clone(),
        Arc::new(directory),
        Duration::from_secs(5),
    ));
    ChatFixture {
        service,
        store,
        hot,
    }
}
