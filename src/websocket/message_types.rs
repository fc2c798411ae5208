use crate::models::ChatMessage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire envelope for WebSocket frames. The hub routes on `type` only;
/// `data` is an opaque passthrough parsed by room-bound handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chatroom_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl WsEnvelope {
    pub fn message(message: &ChatMessage) -> Self {
        Self {
            kind: "message".to_string(),
            chatroom_id: Some(message.chatroom_id.clone()),
            content: None,
            data: serde_json::to_value(message).ok(),
        }
    }

    pub fn joined(chatroom_id: &str) -> Self {
        Self {
            kind: "joined".to_string(),
            chatroom_id: Some(chatroom_id.to_string()),
            content: None,
            data: None,
        }
    }

    pub fn left(chatroom_id: &str) -> Self {
        Self {
            kind: "left".to_string(),
            chatroom_id: Some(chatroom_id.to_string()),
            content: None,
            data: None,
        }
    }

    pub fn recent(chatroom_id: &str, messages: &[ChatMessage]) -> Self {
        Self {
            kind: "recent".to_string(),
            chatroom_id: Some(chatroom_id.to_string()),
            content: None,
            data: serde_json::to_value(messages).ok(),
        }
    }

    pub fn error(detail: &str) -> Self {
        Self {
            kind: "error".to_string(),
            chatroom_id: None,
            content: Some(detail.to_string()),
            data: None,
        }
    }

    pub fn pong() -> Self {
        Self {
            kind: "pong".to_string(),
            chatroom_id: None,
            content: None,
            data: None,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"error"}"#.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageType;

    #[test]
    fn envelope_round_trip() {
        let raw = r#"{"type":"send_message","chatroom_id":"r1","content":"hi"}"#;
        let envelope: WsEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.kind, "send_message");
        assert_eq!(envelope.chatroom_id.as_deref(), Some("r1"));
        assert!(envelope.data.is_none());
    }

    #[test]
    fn data_stays_opaque() {
        let raw = r#"{"type":"custom","data":{"nested":{"deep":[1,2,3]}}}"#;
        let envelope: WsEnvelope = serde_json::from_str(raw).unwrap();
        let data = envelope.data.unwrap();
        assert_eq!(data["nested"]["deep"][2], 3);
    }

    #[test]
    fn recent_envelope_lists_messages_in_order() {
        let first = ChatMessage::new("r1", "u1", "alice", "one", MessageType::Text);
        let second = ChatMessage::new("r1", "u2", "bob", "two", MessageType::Text);
        let envelope = WsEnvelope::recent("r1", &[first, second]);
        let value: Value = serde_json::from_str(&envelope.to_json()).unwrap();
        assert_eq!(value["type"], "recent");
        assert_eq!(value["data"][0]["content"], "one");
        assert_eq!(value["data"][1]["content"], "two");
    }

    #[test]
    fn message_envelope_embeds_the_record() {
        let msg = ChatMessage::new("r1", "u1", "alice", "hi", MessageType::Text);
        let envelope = WsEnvelope::message(&msg);
        let value: Value = serde_json::from_str(&envelope.to_json()).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["chatroom_id"], "r1");
        assert_eq!(value["data"]["content"], "hi");
    }
}
