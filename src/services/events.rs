//! Lifecycle event sink.
//!
//! Delivery is best-effort; nothing on a request path may block on it.
//! Development runs log the payload instead of touching Kinesis.

use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use aws_sdk_kinesis::primitives::Blob;
use serde_json::Value;
use tracing::{debug, info};

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: Value) -> AppResult<()>;
}

pub struct KinesisEventSink {
    client: aws_sdk_kinesis::Client,
    stream_name: String,
}

impl KinesisEventSink {
    pub fn new(client: aws_sdk_kinesis::Client, stream_name: impl Into<String>) -> Self {
        Self {
            client,
            stream_name: stream_name.into(),
        }
    }
}

#[async_trait]
impl EventSink for KinesisEventSink {
    async fn publish(&self, event: Value) -> AppResult<()> {
        let payload = serde_json::to_vec(&event)?;
        let out = self
            .client
            .put_record()
            .stream_name(&self.stream_name)
            .partition_key("default")
            .data(Blob::new(payload))
            .send()
            .await
            .map_err(|e| AppError::Unavailable(format!("kinesis put_record: {e}")))?;
        debug!(sequence_number = %out.sequence_number(), "event published");
        Ok(())
    }
}

/// Stands in for Kinesis in development.
pub struct MockEventSink;

#[async_trait]
impl EventSink for MockEventSink {
    async fn publish(&self, event: Value) -> AppResult<()> {
        info!(event = %event, "[mock] event sink");
        Ok(())
    }
}
