//! Stream lifecycle controller.
//!
//! Owns the stream state machine (`pending -> live -> ended | error`) and
//! the ingest session records. Durable-write failures abort the transition;
//! hot-store and event-sink failures are logged and the transition proceeds.

use crate::error::{AppError, AppResult};
use crate::models::{Stream, StreamSession, StreamStatus, SESSION_TTL};
use crate::repository::{HotStore, StreamStore};
use crate::services::events::EventSink;
use crate::services::recordings::RecordingStore;
use crate::services::user_client::{KeyValidation, UserDirectory};
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Fields a caller may change through the update path. Absent fields are
/// left untouched.
#[derive(Debug, Default, Clone)]
pub struct StreamUpdate {
    pub status: Option<StreamStatus>,
    pub viewer_count: Option<i64>,
    pub duration_seconds: Option<i64>,
    pub recording_url: Option<String>,
}

pub struct StreamService {
    streams: Arc<dyn StreamStore>,
    hot: Arc<dyn HotStore>,
    events: Arc<dyn EventSink>,
    users: Arc<dyn UserDirectory>,
    recordings: Arc<RecordingStore>,
    op_timeout: Duration,
}

impl StreamService {
    pub fn new(
        streams: Arc<dyn StreamStore>,
        hot: Arc<dyn HotStore>,
        events: Arc<dyn EventSink>,
        users: Arc<dyn UserDirectory>,
        recordings: Arc<RecordingStore>,
        op_timeout: Duration,
    ) -> Self {
        Self {
            streams,
            hot,
            events,
            users,
            recordings,
            op_timeout,
        }
    }

    /// Bounds a durable-store call; expiry aborts without mutation.
    async fn deadline<T>(&self, fut: impl Future<Output = AppResult<T>>) -> AppResult<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Unavailable("store deadline exceeded".into())),
        }
    }

    async fn publish_event(&self, event: serde_json::Value) {
        if let Err(e) = self.events.publish(event).await {
            warn!(error = %e, "could not publish lifecycle event");
        }
    }

    /// Validates a stream key against the user directory and, on success,
    /// upserts the ingest session. No stream row is created here.
    pub async fn authenticate(
        &self,
        stream_key: &str,
        client_ip: &str,
        app_name: &str,
    ) -> AppResult<KeyValidation> {
        let validation = self
            .users
            .validate_stream_key(stream_key, client_ip, app_name)
            .await?;

        if !validation.valid {
            warn!(%stream_key, %client_ip, "invalid stream key");
            return Err(AppError::Unauthenticated("invalid stream key".into()));
        }

        let session = StreamSession {
            user_id: validation.user_id,
            username: validation.username.clone(),
            stream_key: stream_key.to_string(),
            client_ip: client_ip.to_string(),
            app_name: app_name.to_string(),
            started_at: Utc::now().timestamp(),
            stream_id: None,
            permissions: validation.permissions,
        };
        if let Err(e) = self.hot.session_put(stream_key, &session, SESSION_TTL).await {
            warn!(%stream_key, error = %e, "could not store ingest session");
        }

        info!(%stream_key, user_id = validation.user_id, username = %validation.username, "stream authorized");
        Ok(validation)
    }

    /// Creates the live stream row for an authenticated session. Re-delivery
    /// within the same session returns the already-created stream.
    pub async fn stream_started(
        &self,
        stream_key: &str,
        client_ip: &str,
        app_name: &str,
    ) -> AppResult<Stream> {
        let mut session = self
            .hot
            .session_get(stream_key)
            .await?
            .ok_or_else(|| {
                AppError::FailedPrecondition(format!("no ingest session for key {stream_key}"))
            })?;

        if let Some(stream_id) = &session.stream_id {
            if let Some(existing) = self.deadline(self.streams.get_stream(stream_id)).await? {
                info!(%stream_key, stream_id = %existing.id, "stream already created for this session");
                return Ok(existing);
            }
        }

        // One live stream per user at a time.
        let live = self
            .deadline(self.streams.list_streams_by_status(StreamStatus::Live))
            .await?;
        if let Some(existing) = live.iter().find(|s| s.user_id == session.user_id) {
            return Err(AppError::AlreadyExists(format!(
                "user {} already has live stream {}",
                session.user_id, existing.id
            )));
        }

        let now = Utc::now();
        let stream = Stream {
            id: Stream::generate_id(),
            user_id: session.user_id,
            stream_key: stream_key.to_string(),
            title: format!("Live Stream - {}", now.format("%Y-%m-%d %H:%M")),
            status: StreamStatus::Live,
            started_at: Some(now),
            ended_at: None,
            duration_seconds: 0,
            viewer_count: 0,
            recording_url: None,
            metadata: HashMap::from([
                ("client_ip".to_string(), client_ip.to_string()),
                ("app_name".to_string(), app_name.to_string()),
                ("session_started".to_string(), now.to_rfc3339()),
            ]),
            created_at: now,
            updated_at: now,
        };
        self.deadline(self.streams.put_stream(&stream)).await?;

        session.stream_id = Some(stream.id.clone());
        if let Err(e) = self.hot.session_put(stream_key, &session, SESSION_TTL).await {
            warn!(%stream_key, error = %e, "could not write stream id back to session");
        }

        self.publish_event(json!({
            "event_type": "stream_started",
            "stream_id": stream.id,
            "user_id": stream.user_id,
            "timestamp": now.timestamp(),
            "metadata": {
                "stream_key": stream_key,
                "client_ip": client_ip,
                "app_name": app_name,
            },
        }))
        .await;

        info!(stream_id = %stream.id, %stream_key, "stream started");
        Ok(stream)
    }

    /// Resolves a stream from the session, falling back to the key index.
    async fn find_stream_for_key(&self, stream_key: &str) -> AppResult<Stream> {
        let session = self.hot.session_get(stream_key).await.unwrap_or_else(|e| {
            warn!(%stream_key, error = %e, "session lookup failed, using key index");
            None
        });

        if let Some(stream_id) = session.as_ref().and_then(|s| s.stream_id.as_deref()) {
            if let Some(stream) = self.deadline(self.streams.get_stream(stream_id)).await? {
                return Ok(stream);
            }
        }
        self.deadline(self.streams.get_stream_by_key(stream_key))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("stream for key {stream_key}")))
    }

    pub async fn stream_ended(
        &self,
        stream_key: &str,
        reported_duration: Option<i64>,
    ) -> AppResult<Stream> {
        let mut stream = self.find_stream_for_key(stream_key).await?;
        if stream.status.is_terminal() {
            return Err(AppError::FailedPrecondition(format!(
                "stream {} is not live",
                stream.id
            )));
        }

        let now = Utc::now();
        let computed = stream
            .started_at
            .map(|started| (now - started).num_seconds())
            .unwrap_or(0);
        let snapshot = stream.updated_at;

        stream.status = StreamStatus::Ended;
        stream.ended_at = Some(now);
        stream.duration_seconds = reported_duration.unwrap_or(computed).max(0);
        stream.updated_at = now;
        self.deadline(self.streams.update_stream(&stream, snapshot))
            .await?;

        if let Err(e) = self.hot.session_del(stream_key).await {
            warn!(%stream_key, error = %e, "could not purge ingest session");
        }

        self.publish_event(json!({
            "event_type": "stream_ended",
            "stream_id": stream.id,
            "user_id": stream.user_id,
            "duration": stream.duration_seconds,
            "timestamp": now.timestamp(),
            "metadata": {
                "stream_key": stream_key,
                "end_reason": "normal",
            },
        }))
        .await;

        info!(stream_id = %stream.id, duration = stream.duration_seconds, "stream ended");
        Ok(stream)
    }

    /// Attaches recording details to the stream. Status is left untouched.
    pub async fn recording_completed(
        &self,
        stream_key: &str,
        file_path: &str,
        file_size_bytes: i64,
        duration_seconds: i64,
    ) -> AppResult<Stream> {
        let mut stream = self.find_stream_for_key(stream_key).await?;
        let snapshot = stream.updated_at;

        stream.recording_url = Some(file_path.to_string());
        stream
            .metadata
            .insert("recording_size".to_string(), file_size_bytes.to_string());
        stream.metadata.insert(
            "recording_duration".to_string(),
            duration_seconds.to_string(),
        );
        stream.updated_at = Utc::now();
        self.deadline(self.streams.update_stream(&stream, snapshot))
            .await?;

        if let Err(e) = self
            .recordings
            .put_manifest(&stream.id, file_path, file_size_bytes, duration_seconds)
            .await
        {
            warn!(stream_id = %stream.id, error = %e, "could not archive recording manifest");
        }

        self.publish_event(json!({
            "event_type": "recording_completed",
            "stream_id": stream.id,
            "stream_key": stream_key,
            "recording_path": file_path,
            "file_size": file_size_bytes,
            "duration": duration_seconds,
            "timestamp": Utc::now().timestamp(),
        }))
        .await;

        Ok(stream)
    }

    /// Monotonic update: status may only move forward, and a writer holding
    /// a stale snapshot loses to the concurrent winner.
    pub async fn update_stream(&self, stream_id: &str, update: StreamUpdate) -> AppResult<Stream> {
        let mut stream = self
            .deadline(self.streams.get_stream(stream_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("stream {stream_id}")))?;
        let snapshot = stream.updated_at;

        if let Some(new_status) = update.status {
            if new_status != stream.status {
                if new_status.rank() < stream.status.rank() || stream.status.is_terminal() {
                    return Err(AppError::FailedPrecondition(format!(
                        "cannot move stream {} from {} to {}",
                        stream.id, stream.status, new_status
                    )));
                }
                stream.status = new_status;
                if new_status == StreamStatus::Ended && stream.ended_at.is_none() {
                    stream.ended_at = Some(Utc::now());
                }
            }
        }
        if let Some(viewer_count) = update.viewer_count {
            stream.viewer_count = viewer_count.max(0);
        }
        if let Some(duration) = update.duration_seconds {
            stream.duration_seconds = duration.max(0);
        }
        if let Some(url) = update.recording_url {
            stream.recording_url = Some(url);
        }

        stream.updated_at = Utc::now();
        self.deadline(self.streams.update_stream(&stream, snapshot))
            .await?;
        Ok(stream)
    }

    pub async fn end_stream_by_id(
        &self,
        stream_id: &str,
        duration_seconds: Option<i64>,
        recording_path: Option<&str>,
    ) -> AppResult<Stream> {
        let stream = self
            .deadline(self.streams.get_stream(stream_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("stream {stream_id}")))?;

        let mut ended = self.stream_ended(&stream.stream_key, duration_seconds).await?;
        if let Some(path) = recording_path.filter(|p| !p.is_empty()) {
            ended = self
                .update_stream(
                    &ended.id,
                    StreamUpdate {
                        recording_url: Some(path.to_string()),
                        ..Default::default()
                    },
                )
                .await?;
        }
        Ok(ended)
    }

    pub async fn get_stream(&self, stream_id: &str) -> AppResult<Stream> {
        self.deadline(self.streams.get_stream(stream_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("stream {stream_id}")))
    }

    pub async fn get_active_streams(&self) -> AppResult<Vec<Stream>> {
        self.deadline(self.streams.list_streams_by_status(StreamStatus::Live))
            .await
    }

    /// Diagnostic lookup for `GET /stream/{key}`.
    pub async fn get_stream_info(
        &self,
        stream_key: &str,
    ) -> AppResult<(Option<StreamSession>, Option<Stream>)> {
        let session = self.hot.session_get(stream_key).await?;
        let stream = match session.as_ref().and_then(|s| s.stream_id.as_deref()) {
            Some(stream_id) => self.deadline(self.streams.get_stream(stream_id)).await?,
            None => None,
        };
        if session.is_none() && stream.is_none() {
            return Err(AppError::NotFound(format!("session for key {stream_key}")));
        }
        Ok((session, stream))
    }

    /// Key validation without session side effects, for the RPC surface.
    pub async fn validate_key(
        &self,
        stream_key: &str,
        ip_address: &str,
        app_name: &str,
    ) -> AppResult<KeyValidation> {
        self.users
            .validate_stream_key(stream_key, ip_address, app_name)
            .await
    }

    /// RPC-side stream creation for callers that already hold a validated
    /// key (sibling services); mirrors the webhook path minus the session.
    pub async fn create_stream(
        &self,
        user_id: i64,
        stream_key: &str,
        title: &str,
        metadata: HashMap<String, String>,
    ) -> AppResult<Stream> {
        let live = self
            .deadline(self.streams.list_streams_by_status(StreamStatus::Live))
            .await?;
        if live.iter().any(|s| s.user_id == user_id) {
            return Err(AppError::AlreadyExists(format!(
                "user {user_id} already has a live stream"
            )));
        }

        let now = Utc::now();
        let stream = Stream {
            id: Stream::generate_id(),
            user_id,
            stream_key: stream_key.to_string(),
            title: if title.is_empty() {
                format!("Live Stream - {}", now.format("%Y-%m-%d %H:%M"))
            } else {
                title.to_string()
            },
            status: StreamStatus::Live,
            started_at: Some(now),
            ended_at: None,
            duration_seconds: 0,
            viewer_count: 0,
            recording_url: None,
            metadata,
            created_at: now,
            updated_at: now,
        };
        self.deadline(self.streams.put_stream(&stream)).await?;
        Ok(stream)
    }
}
