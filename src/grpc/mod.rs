//! RPC surface: `StreamService` and `ChatService` servers plus the
//! conversions between domain models and wire types.

pub mod chat;
pub mod middleware;
pub mod stream;

use crate::error::AppError;
use crate::models;
use chrono::{DateTime, Utc};

// Generated protobuf types.
pub mod proto {
    pub mod common {
        tonic::include_proto!("common");
    }
    pub mod stream {
        tonic::include_proto!("stream");
    }
    pub mod chat {
        tonic::include_proto!("chat");
    }
    pub mod user {
        tonic::include_proto!("user");
    }
}

/// Descriptor set compiled by build.rs, served over gRPC reflection.
pub const FILE_DESCRIPTOR_SET: &[u8] =
    tonic::include_file_descriptor_set!("interaction_descriptor");

/// 4 MiB cap on request and response messages.
pub const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

pub fn ok_status(message: &str) -> proto::common::Status {
    proto::common::Status {
        code: tonic::Code::Ok as i32,
        message: message.to_string(),
        success: true,
    }
}

pub fn error_status(err: &AppError) -> proto::common::Status {
    proto::common::Status {
        code: err.grpc_code() as i32,
        message: err.to_string(),
        success: false,
    }
}

pub fn to_proto_timestamp(ts: DateTime<Utc>) -> proto::common::Timestamp {
    proto::common::Timestamp {
        seconds: ts.timestamp(),
        nanos: ts.timestamp_subsec_nanos() as i32,
    }
}

pub fn stream_status_to_proto(status: models::StreamStatus) -> proto::stream::StreamStatus {
    match status {
        models::StreamStatus::Pending => proto::stream::StreamStatus::StreamPending,
        models::StreamStatus::Live => proto::stream::StreamStatus::StreamLive,
        models::StreamStatus::Ended => proto::stream::StreamStatus::StreamEnded,
        models::StreamStatus::Error => proto::stream::StreamStatus::StreamError,
    }
}

pub fn stream_status_from_proto(status: proto::stream::StreamStatus) -> models::StreamStatus {
    match status {
        proto::stream::StreamStatus::StreamPending => models::StreamStatus::Pending,
        proto::stream::StreamStatus::StreamLive => models::StreamStatus::Live,
        proto::stream::StreamStatus::StreamEnded => models::StreamStatus::Ended,
        proto::stream::StreamStatus::StreamError => models::StreamStatus::Error,
    }
}

pub fn stream_to_proto(stream: &models::Stream) -> proto::stream::Stream {
    let metadata = if stream.metadata.is_empty() {
        None
    } else {
        Some(proto::stream::StreamMetadata {
            client_ip: stream.metadata.get("client_ip").cloned().unwrap_or_default(),
            app_name: stream.metadata.get("app_name").cloned().unwrap_or_default(),
            bitrate: stream
                .metadata
                .get("bitrate")
                .and_then(|b| b.parse().ok())
                .unwrap_or(0),
            resolution: stream.metadata.get("resolution").cloned().unwrap_or_default(),
            codec: stream.metadata.get("codec").cloned().unwrap_or_default(),
            custom_data: stream.metadata.clone(),
        })
    };

    proto::stream::Stream {
        id: stream.id.clone(),
        user_id: stream.user_id,
        stream_key: stream.stream_key.clone(),
        title: stream.title.clone(),
        status: stream_status_to_proto(stream.status) as i32,
        started_at: stream.started_at.map(to_proto_timestamp),
        ended_at: stream.ended_at.map(to_proto_timestamp),
        duration_seconds: stream.duration_seconds,
        viewer_count: stream.viewer_count,
        recording_url: stream.recording_url.clone().unwrap_or_default(),
        metadata,
        created_at: Some(to_proto_timestamp(stream.created_at)),
        updated_at: Some(to_proto_timestamp(stream.updated_at)),
    }
}

pub fn chatroom_to_proto(room: &models::Chatroom) -> proto::chat::Chatroom {
    proto::chat::Chatroom {
        id: room.id.clone(),
        name: room.name.clone(),
        description: room.description.clone(),
        creator_id: room.creator_id.clone(),
        is_private: room.is_private,
        member_ids: room.member_ids.clone(),
        created_at: Some(to_proto_timestamp(room.created_at)),
        updated_at: Some(to_proto_timestamp(room.updated_at)),
    }
}

pub fn message_type_to_proto(kind: models::MessageType) -> proto::chat::MessageType {
    match kind {
        models::MessageType::Text => proto::chat::MessageType::Text,
        models::MessageType::Image => proto::chat::MessageType::Image,
        models::MessageType::File => proto::chat::MessageType::File,
        models::MessageType::System => proto::chat::MessageType::System,
    }
}

pub fn message_type_from_proto(kind: proto::chat::MessageType) -> models::MessageType {
    match kind {
        proto::chat::MessageType::Text => models::MessageType::Text,
        proto::chat::MessageType::Image => models::MessageType::Image,
        proto::chat::MessageType::File => models::MessageType::File,
        proto::chat::MessageType::System => models::MessageType::System,
    }
}

pub fn message_to_proto(message: &models::ChatMessage) -> proto::chat::Message {
    proto::chat::Message {
        id: message.id.clone(),
        chatroom_id: message.chatroom_id.clone(),
        user_id: message.user_id.clone(),
        username: message.username.clone(),
        content: message.content.clone(),
        r#type: message_type_to_proto(message.message_type) as i32,
        created_at: Some(to_proto_timestamp(message.created_at)),
        is_edited: message.is_edited,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn status_mapping_round_trips() {
        for status in [
            models::StreamStatus::Pending,
            models::StreamStatus::Live,
            models::StreamStatus::Ended,
            models::StreamStatus::Error,
        ] {
            assert_eq!(stream_status_from_proto(stream_status_to_proto(status)), status);
        }
    }

    #[test]
    fn stream_conversion_keeps_persisted_fields() {
        let now = Utc::now();
        let stream = models::Stream {
            id: "stream_1".into(),
            user_id: 7,
            stream_key: "key".into(),
            title: "t".into(),
            status: models::StreamStatus::Ended,
            started_at: Some(now),
            ended_at: Some(now),
            duration_seconds: 30,
            viewer_count: 2,
            recording_url: Some("/rec/a.flv".into()),
            metadata: HashMap::from([("app_name".to_string(), "live".to_string())]),
            created_at: now,
            updated_at: now,
        };
        let wire = stream_to_proto(&stream);
        assert_eq!(wire.duration_seconds, 30);
        assert_eq!(wire.recording_url, "/rec/a.flv");
        assert_eq!(wire.metadata.unwrap().app_name, "live");
        assert_eq!(wire.status, proto::stream::StreamStatus::StreamEnded as i32);
    }

    #[test]
    fn error_status_carries_grpc_code() {
        let status = error_status(&AppError::PermissionDenied("nope".into()));
        assert_eq!(status.code, tonic::Code::PermissionDenied as i32);
        assert!(!status.success);
    }
}
