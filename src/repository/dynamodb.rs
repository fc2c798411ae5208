//! DynamoDB-backed durable stores.
//!
//! Tables are item-oriented: streams keyed by `id` with `stream_key-index`
//! and `status-index` GSIs; messages keyed by `id` with a
//! `chatroom_id-created_at-index` GSI whose range attribute (`sort_key`)
//! is `created_at#id`, giving chronological order with a deterministic
//! id tie-break.

use crate::config::DynamoDbConfig;
use crate::error::{AppError, AppResult};
use crate::models::{ChatMessage, Chatroom, MessageType, Stream, StreamStatus};
use crate::repository::{decode_cursor, encode_cursor, ChatStore, StreamStore};
use async_trait::async_trait;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

const STREAM_KEY_INDEX: &str = "stream_key-index";
const STATUS_INDEX: &str = "status-index";
const MESSAGE_ROOM_INDEX: &str = "chatroom_id-created_at-index";

/// Fixed-width timestamp encoding; sorts the same as the instant.
const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9fZ";

pub async fn build_client(cfg: &DynamoDbConfig) -> Client {
    let mut loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(
            aws_config::Region::new(cfg.region.clone()),
        );
    if let Some(endpoint) = &cfg.endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    Client::new(&loader.load().await)
}

fn sdk_err<E>(op: &str, err: SdkError<E>) -> AppError
where
    E: std::error::Error + Send + Sync + 'static,
{
    AppError::Unavailable(format!("dynamodb {op}: {err}"))
}

fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn decode_ts(raw: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Internal(format!("malformed timestamp {raw:?}: {e}")))
}

fn get_s(item: &HashMap<String, AttributeValue>, name: &str) -> AppResult<String> {
    item.get(name)
        .and_then(|v| v.as_s().ok())
        .cloned()
        .ok_or_else(|| AppError::Internal(format!("item missing string attribute {name:?}")))
}

fn opt_s(item: &HashMap<String, AttributeValue>, name: &str) -> Option<String> {
    item.get(name).and_then(|v| v.as_s().ok()).cloned()
}

fn get_n(item: &HashMap<String, AttributeValue>, name: &str) -> AppResult<i64> {
    item.get(name)
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| AppError::Internal(format!("item missing numeric attribute {name:?}")))
}

fn get_bool(item: &HashMap<String, AttributeValue>, name: &str) -> bool {
    item.get(name)
        .and_then(|v| v.as_bool().ok())
        .copied()
        .unwrap_or(false)
}

fn stream_to_item(stream: &Stream) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::from([
        ("id".to_string(), AttributeValue::S(stream.id.clone())),
        (
            "user_id".to_string(),
            AttributeValue::N(stream.user_id.to_string()),
        ),
        (
            "stream_key".to_string(),
            AttributeValue::S(stream.stream_key.clone()),
        ),
        ("title".to_string(), AttributeValue::S(stream.title.clone())),
        (
            "status".to_string(),
            AttributeValue::S(stream.status.as_str().to_string()),
        ),
        (
            "duration".to_string(),
            AttributeValue::N(stream.duration_seconds.to_string()),
        ),
        (
            "viewer_count".to_string(),
            AttributeValue::N(stream.viewer_count.to_string()),
        ),
        (
            "created_at".to_string(),
            AttributeValue::S(encode_ts(stream.created_at)),
        ),
        (
            "updated_at".to_string(),
            AttributeValue::S(encode_ts(stream.updated_at)),
        ),
    ]);
    if let Some(started_at) = stream.started_at {
        item.insert(
            "started_at".to_string(),
            AttributeValue::S(encode_ts(started_at)),
        );
    }
    if let Some(ended_at) = stream.ended_at {
        item.insert(
            "ended_at".to_string(),
            AttributeValue::S(encode_ts(ended_at)),
        );
    }
    if let Some(url) = &stream.recording_url {
        item.insert("recording_url".to_string(), AttributeValue::S(url.clone()));
    }
    if !stream.metadata.is_empty() {
        let map = stream
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), AttributeValue::S(v.clone())))
            .collect();
        item.insert("metadata".to_string(), AttributeValue::M(map));
    }
    item
}

fn stream_from_item(item: &HashMap<String, AttributeValue>) -> AppResult<Stream> {
    let status_raw = get_s(item, "status")?;
    let status = StreamStatus::parse(&status_raw)
        .ok_or_else(|| AppError::Internal(format!("unknown stream status {status_raw:?}")))?;

    let metadata = item
        .get("metadata")
        .and_then(|v| v.as_m().ok())
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_s().ok().map(|s| (k.clone(), s.clone())))
                .collect()
        })
        .unwrap_or_default();

    Ok(Stream {
        id: get_s(item, "id")?,
        user_id: get_n(item, "user_id")?,
        stream_key: get_s(item, "stream_key")?,
        title: get_s(item, "title")?,
        status,
        started_at: opt_s(item, "started_at").map(|s| decode_ts(&s)).transpose()?,
        ended_at: opt_s(item, "ended_at").map(|s| decode_ts(&s)).transpose()?,
        duration_seconds: get_n(item, "duration")?,
        viewer_count: get_n(item, "viewer_count")?,
        recording_url: opt_s(item, "recording_url"),
        metadata,
        created_at: decode_ts(&get_s(item, "created_at")?)?,
        updated_at: decode_ts(&get_s(item, "updated_at")?)?,
    })
}

#[derive(Clone)]
pub struct DynamoStreamStore {
    client: Client,
    table: String,
}

impl DynamoStreamStore {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl StreamStore for DynamoStreamStore {
    async fn put_stream(&self, stream: &Stream) -> AppResult<()> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(stream_to_item(stream)))
            .send()
            .await
            .map_err(|e| sdk_err("put_stream", e))?;
        Ok(())
    }

    async fn get_stream(&self, id: &str) -> AppResult<Option<Stream>> {
        let out = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| sdk_err("get_stream", e))?;
        out.item().map(stream_from_item).transpose()
    }

    async fn get_stream_by_key(&self, stream_key: &str) -> AppResult<Option<Stream>> {
        let out = self
            .client
            .query()
            .table_name(&self.table)
            .index_name(STREAM_KEY_INDEX)
            .key_condition_expression("stream_key = :k")
            .expression_attribute_values(":k", AttributeValue::S(stream_key.to_string()))
            .limit(1)
            .send()
            .await
            .map_err(|e| sdk_err("get_stream_by_key", e))?;
        out.items().first().map(stream_from_item).transpose()
    }

    async fn list_streams_by_status(&self, status: StreamStatus) -> AppResult<Vec<Stream>> {
        // `status` is a DynamoDB reserved word.
        let out = self
            .client
            .query()
            .table_name(&self.table)
            .index_name(STATUS_INDEX)
            .key_condition_expression("#status = :s")
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":s", AttributeValue::S(status.as_str().to_string()))
            .send()
            .await
            .map_err(|e| sdk_err("list_streams_by_status", e))?;
        out.items().iter().map(stream_from_item).collect()
    }

    async fn update_stream(
        &self,
        stream: &Stream,
        expected_updated_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(stream_to_item(stream)))
            .condition_expression("updated_at = :expected")
            .expression_attribute_values(
                ":expected",
                AttributeValue::S(encode_ts(expected_updated_at)),
            )
            .send()
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError(err))
                if err.err().is_conditional_check_failed_exception() =>
            {
                Err(AppError::FailedPrecondition(format!(
                    "stream {} was modified concurrently",
                    stream.id
                )))
            }
            Err(e) => Err(sdk_err("update_stream", e)),
        }
    }
}

fn chatroom_to_item(room: &Chatroom) -> HashMap<String, AttributeValue> {
    let members = room
        .member_ids
        .iter()
        .map(|m| AttributeValue::S(m.clone()))
        .collect();
    HashMap::from([
        ("id".to_string(), AttributeValue::S(room.id.clone())),
        ("name".to_string(), AttributeValue::S(room.name.clone())),
        (
            "description".to_string(),
            AttributeValue::S(room.description.clone()),
        ),
        (
            "creator_id".to_string(),
            AttributeValue::S(room.creator_id.clone()),
        ),
        (
            "is_private".to_string(),
            AttributeValue::Bool(room.is_private),
        ),
        ("member_ids".to_string(), AttributeValue::L(members)),
        (
            "created_at".to_string(),
            AttributeValue::S(encode_ts(room.created_at)),
        ),
        (
            "updated_at".to_string(),
            AttributeValue::S(encode_ts(room.updated_at)),
        ),
    ])
}

fn chatroom_from_item(item: &HashMap<String, AttributeValue>) -> AppResult<Chatroom> {
    let member_ids = item
        .get("member_ids")
        .and_then(|v| v.as_l().ok())
        .map(|l| {
            l.iter()
                .filter_map(|v| v.as_s().ok().cloned())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    Ok(Chatroom {
        id: get_s(item, "id")?,
        name: get_s(item, "name")?,
        description: opt_s(item, "description").unwrap_or_default(),
        creator_id: get_s(item, "creator_id")?,
        is_private: get_bool(item, "is_private"),
        member_ids,
        created_at: decode_ts(&get_s(item, "created_at")?)?,
        updated_at: decode_ts(&get_s(item, "updated_at")?)?,
    })
}

fn message_to_item(message: &ChatMessage) -> HashMap<String, AttributeValue> {
    HashMap::from([
        ("id".to_string(), AttributeValue::S(message.id.clone())),
        (
            "chatroom_id".to_string(),
            AttributeValue::S(message.chatroom_id.clone()),
        ),
        (
            "user_id".to_string(),
            AttributeValue::S(message.user_id.clone()),
        ),
        (
            "username".to_string(),
            AttributeValue::S(message.username.clone()),
        ),
        (
            "content".to_string(),
            AttributeValue::S(message.content.clone()),
        ),
        (
            "type".to_string(),
            AttributeValue::S(
                serde_json::to_value(message.message_type)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_else(|| "text".to_string()),
            ),
        ),
        (
            "created_at".to_string(),
            AttributeValue::S(encode_ts(message.created_at)),
        ),
        (
            "sort_key".to_string(),
            AttributeValue::S(message.sort_key()),
        ),
        (
            "is_edited".to_string(),
            AttributeValue::Bool(message.is_edited),
        ),
    ])
}

fn message_from_item(item: &HashMap<String, AttributeValue>) -> AppResult<ChatMessage> {
    let type_raw = opt_s(item, "type").unwrap_or_else(|| "text".to_string());
    let message_type: MessageType = serde_json::from_value(serde_json::Value::String(type_raw))
        .unwrap_or(MessageType::Text);

    Ok(ChatMessage {
        id: get_s(item, "id")?,
        chatroom_id: get_s(item, "chatroom_id")?,
        user_id: get_s(item, "user_id")?,
        username: opt_s(item, "username").unwrap_or_default(),
        content: opt_s(item, "content").unwrap_or_default(),
        message_type,
        created_at: decode_ts(&get_s(item, "created_at")?)?,
        is_edited: get_bool(item, "is_edited"),
    })
}

#[derive(Clone)]
pub struct DynamoChatStore {
    client: Client,
    chatroom_table: String,
    message_table: String,
}

impl DynamoChatStore {
    pub fn new(
        client: Client,
        chatroom_table: impl Into<String>,
        message_table: impl Into<String>,
    ) -> Self {
        Self {
            client,
            chatroom_table: chatroom_table.into(),
            message_table: message_table.into(),
        }
    }
}

#[async_trait]
impl ChatStore for DynamoChatStore {
    async fn put_chatroom(&self, room: &Chatroom) -> AppResult<()> {
        self.client
            .put_item()
            .table_name(&self.chatroom_table)
            .set_item(Some(chatroom_to_item(room)))
            .send()
            .await
            .map_err(|e| sdk_err("put_chatroom", e))?;
        Ok(())
    }

    async fn get_chatroom(&self, id: &str) -> AppResult<Option<Chatroom>> {
        let out = self
            .client
            .get_item()
            .table_name(&self.chatroom_table)
            .key("id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| sdk_err("get_chatroom", e))?;
        out.item().map(chatroom_from_item).transpose()
    }

    async fn add_member(&self, room_id: &str, user_id: &str) -> AppResult<()> {
        let result = self
            .client
            .update_item()
            .table_name(&self.chatroom_table)
            .key("id", AttributeValue::S(room_id.to_string()))
            .update_expression("SET member_ids = list_append(member_ids, :new), updated_at = :now")
            .condition_expression("attribute_exists(id) AND NOT contains(member_ids, :uid)")
            .expression_attribute_values(
                ":new",
                AttributeValue::L(vec![AttributeValue::S(user_id.to_string())]),
            )
            .expression_attribute_values(":uid", AttributeValue::S(user_id.to_string()))
            .expression_attribute_values(":now", AttributeValue::S(encode_ts(Utc::now())))
            .send()
            .await;
        match result {
            Ok(_) => Ok(()),
            // Already a member: the mutation is a no-op by contract.
            Err(SdkError::ServiceError(err))
                if err.err().is_conditional_check_failed_exception() =>
            {
                Ok(())
            }
            Err(e) => Err(sdk_err("add_member", e)),
        }
    }

    async fn remove_member(&self, room_id: &str, user_id: &str) -> AppResult<()> {
        let room = self
            .get_chatroom(room_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("chatroom {room_id}")))?;

        let remaining: Vec<AttributeValue> = room
            .member_ids
            .iter()
            .filter(|m| m.as_str() != user_id)
            .map(|m| AttributeValue::S(m.clone()))
            .collect();

        self.client
            .update_item()
            .table_name(&self.chatroom_table)
            .key("id", AttributeValue::S(room_id.to_string()))
            .update_expression("SET member_ids = :members, updated_at = :now")
            .expression_attribute_values(":members", AttributeValue::L(remaining))
            .expression_attribute_values(":now", AttributeValue::S(encode_ts(Utc::now())))
            .send()
            .await
            .map_err(|e| sdk_err("remove_member", e))?;
        Ok(())
    }

    async fn is_member(&self, room_id: &str, user_id: &str) -> AppResult<bool> {
        let room = self
            .get_chatroom(room_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("chatroom {room_id}")))?;
        Ok(room.has_member(user_id))
    }

    async fn list_rooms_for_user(&self, user_id: &str) -> AppResult<Vec<Chatroom>> {
        // No index covers membership; a filtered scan is the documented
        // fallback for this access path.
        let out = self
            .client
            .scan()
            .table_name(&self.chatroom_table)
            .filter_expression("contains(member_ids, :u)")
            .expression_attribute_values(":u", AttributeValue::S(user_id.to_string()))
            .send()
            .await
            .map_err(|e| sdk_err("list_rooms_for_user", e))?;
        out.items().iter().map(chatroom_from_item).collect()
    }

    async fn put_message(&self, message: &ChatMessage) -> AppResult<()> {
        self.client
            .put_item()
            .table_name(&self.message_table)
            .set_item(Some(message_to_item(message)))
            .send()
            .await
            .map_err(|e| sdk_err("put_message", e))?;
        Ok(())
    }

    async fn list_messages(
        &self,
        room_id: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> AppResult<(Vec<ChatMessage>, Option<String>)> {
        let mut query = self
            .client
            .query()
            .table_name(&self.message_table)
            .index_name(MESSAGE_ROOM_INDEX)
            .scan_index_forward(true)
            .limit(limit as i32)
            .expression_attribute_values(":c", AttributeValue::S(room_id.to_string()));

        query = match cursor {
            Some(cursor) => {
                let after = decode_cursor(cursor)?;
                query
                    .key_condition_expression("chatroom_id = :c AND sort_key > :after")
                    .expression_attribute_values(":after", AttributeValue::S(after))
            }
            None => query.key_condition_expression("chatroom_id = :c"),
        };

        let out = query.send().await.map_err(|e| sdk_err("list_messages", e))?;
        let messages: Vec<ChatMessage> = out
            .items()
            .iter()
            .map(message_from_item)
            .collect::<AppResult<_>>()?;

        let next_cursor = if messages.len() == limit {
            messages.last().map(|m| encode_cursor(&m.sort_key()))
        } else {
            None
        };
        Ok((messages, next_cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageType;

    #[test]
    fn cursor_round_trip() {
        let key = "2024-05-01T12:00:00.000000000Z#abcd";
        let encoded = encode_cursor(key);
        assert_eq!(decode_cursor(&encoded).unwrap(), key);
        assert!(decode_cursor("not base64 !!!").is_err());
    }

    #[test]
    fn stream_item_round_trip() {
        let stream = Stream {
            id: "stream_abc".into(),
            user_id: 42,
            stream_key: "abcdef12".into(),
            title: "Live Stream".into(),
            status: StreamStatus::Live,
            started_at: Some(Utc::now()),
            ended_at: None,
            duration_seconds: 0,
            viewer_count: 3,
            recording_url: None,
            metadata: HashMap::from([("client_ip".to_string(), "10.0.0.1".to_string())]),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let item = stream_to_item(&stream);
        let back = stream_from_item(&item).unwrap();
        assert_eq!(back.id, stream.id);
        assert_eq!(back.user_id, stream.user_id);
        assert_eq!(back.status, StreamStatus::Live);
        assert_eq!(back.metadata.get("client_ip").unwrap(), "10.0.0.1");
        assert!(back.ended_at.is_none());
    }

    #[test]
    fn message_item_round_trip_keeps_type_and_order_key() {
        let msg = ChatMessage::new("room1", "u1", "alice", "hello", MessageType::Image);
        let item = message_to_item(&msg);
        assert_eq!(
            item.get("sort_key").unwrap().as_s().unwrap(),
            &msg.sort_key()
        );
        let back = message_from_item(&item).unwrap();
        assert_eq!(back.message_type, MessageType::Image);
        assert_eq!(back.content, "hello");
    }
}
