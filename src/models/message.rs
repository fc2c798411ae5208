use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sender id reserved for service-generated messages.
pub const SYSTEM_USER_ID: &str = "system";
pub const SYSTEM_USERNAME: &str = "System";

/// Hard cap on message content, in bytes.
pub const MAX_CONTENT_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    File,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub chatroom_id: String,
    pub user_id: String,
    pub username: String,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
    pub is_edited: bool,
}

impl ChatMessage {
    pub fn new(
        chatroom_id: &str,
        user_id: &str,
        username: &str,
        content: &str,
        message_type: MessageType,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            chatroom_id: chatroom_id.to_string(),
            user_id: user_id.to_string(),
            username: username.to_string(),
            content: content.to_string(),
            message_type,
            created_at: Utc::now(),
            is_edited: false,
        }
    }

    pub fn system(chatroom_id: &str, content: &str) -> Self {
        Self::new(
            chatroom_id,
            SYSTEM_USER_ID,
            SYSTEM_USERNAME,
            content,
            MessageType::System,
        )
    }

    /// Durable-store sort value: created_at then id, both lexicographic.
    /// RFC 3339 with fixed-width nanoseconds sorts the same as the instant.
    pub fn sort_key(&self) -> String {
        format!(
            "{}#{}",
            self.created_at.format("%Y-%m-%dT%H:%M:%S%.9fZ"),
            self.id
        )
    }
}
