//! Recording sink.
//!
//! The media server writes the recording itself; this side archives a JSON
//! manifest per finished recording into the bucket so downstream jobs can
//! discover it. Mocked in development.

use crate::error::{AppError, AppResult};
use aws_sdk_s3::primitives::ByteStream;
use serde_json::json;
use tracing::info;

pub struct RecordingStore {
    client: Option<aws_sdk_s3::Client>,
    bucket: String,
}

impl RecordingStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client: Some(client),
            bucket: bucket.into(),
        }
    }

    pub fn mock(bucket: impl Into<String>) -> Self {
        Self {
            client: None,
            bucket: bucket.into(),
        }
    }

    pub async fn put_manifest(
        &self,
        stream_id: &str,
        file_path: &str,
        file_size_bytes: i64,
        duration_seconds: i64,
    ) -> AppResult<String> {
        let key = format!("recordings/{stream_id}/manifest.json");
        let manifest = json!({
            "stream_id": stream_id,
            "file_path": file_path,
            "file_size_bytes": file_size_bytes,
            "duration_seconds": duration_seconds,
            "completed_at": chrono::Utc::now().to_rfc3339(),
        });

        let Some(client) = &self.client else {
            info!(%stream_id, %key, "[mock] recording manifest");
            return Ok(format!("s3://{}/{}", self.bucket, key));
        };

        let body = serde_json::to_vec(&manifest)?;
        client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type("application/json")
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| AppError::Unavailable(format!("s3 put_object: {e}")))?;

        Ok(format!("s3://{}/{}", self.bucket, key))
    }
}
