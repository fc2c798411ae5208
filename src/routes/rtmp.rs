//! Webhooks consumed by the RTMP media server.
//!
//! The server posts either JSON or form-encoded bodies depending on its
//! notify configuration, so every endpoint accepts both. `name` arrives as
//! a bare key or as `app/key`; the last path segment is the key.

use crate::error::AppError;
use crate::state::AppState;
use axum::async_trait;
use axum::extract::{FromRequest, Path, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

/// Accepts `application/json` or `application/x-www-form-urlencoded`.
pub struct JsonOrForm<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| reject(&e.to_string()))?;
            return Ok(Self(value));
        }
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| reject(&e.to_string()))?;
        Ok(Self(value))
    }
}

fn reject(detail: &str) -> Response {
    warn!(%detail, "could not parse ingest callback body");
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "Invalid request format" })),
    )
        .into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct RtmpAuthRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "addr")]
    pub client_ip: String,
    #[serde(default)]
    pub app: String,
    #[serde(default)]
    pub swfurl: String,
    #[serde(default)]
    pub tcurl: String,
    #[serde(default)]
    pub vhost: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RtmpStreamRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "addr")]
    pub client_ip: String,
    #[serde(default)]
    pub app: String,
    /// Seconds, as a string, present on `ended` and `recorded` callbacks.
    #[serde(default)]
    pub duration: String,
    /// Recording file path on `recorded` callbacks.
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub size: String,
}

pub fn extract_stream_key(name: &str) -> String {
    let trimmed = name.trim().trim_start_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed).to_string()
}

fn parse_numeric(value: &str) -> Option<i64> {
    if value.is_empty() {
        None
    } else {
        value.parse().ok()
    }
}

pub async fn authenticate(
    State(state): State<AppState>,
    JsonOrForm(req): JsonOrForm<RtmpAuthRequest>,
) -> Response {
    let stream_key = extract_stream_key(&req.name);
    info!(%stream_key, client_ip = %req.client_ip, app = %req.app, "rtmp auth request");

    match state
        .streams
        .authenticate(&stream_key, &req.client_ip, &req.app)
        .await
    {
        Ok(validation) => (
            StatusCode::OK,
            Json(json!({
                "authorized": true,
                "user_id": validation.user_id,
                "username": validation.username,
                "permissions": {
                    "can_stream": validation.permissions.can_stream,
                    "can_record": validation.permissions.can_record,
                    "max_bitrate": validation.permissions.max_bitrate,
                    "max_duration_minutes": validation.permissions.max_duration_minutes,
                },
            })),
        )
            .into_response(),
        Err(AppError::Unauthenticated(_)) => (
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": "Invalid stream key",
                "code": "INVALID_STREAM_KEY",
            })),
        )
            .into_response(),
        Err(e) => {
            warn!(%stream_key, error = %e, "stream key validation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Internal server error",
                    "code": "VALIDATION_FAILED",
                })),
            )
                .into_response()
        }
    }
}

pub async fn stream_started(
    State(state): State<AppState>,
    JsonOrForm(req): JsonOrForm<RtmpStreamRequest>,
) -> Response {
    let stream_key = extract_stream_key(&req.name);
    info!(%stream_key, client_ip = %req.client_ip, "stream started callback");

    match state
        .streams
        .stream_started(&stream_key, &req.client_ip, &req.app)
        .await
    {
        Ok(stream) => (
            StatusCode::OK,
            Json(json!({
                "message": "Stream started",
                "stream_id": stream.id,
                "status": "live",
            })),
        )
            .into_response(),
        Err(e) => {
            warn!(%stream_key, error = %e, "could not start stream");
            e.into_response()
        }
    }
}

pub async fn stream_ended(
    State(state): State<AppState>,
    JsonOrForm(req): JsonOrForm<RtmpStreamRequest>,
) -> Response {
    let stream_key = extract_stream_key(&req.name);
    info!(%stream_key, duration = %req.duration, "stream ended callback");

    match state
        .streams
        .stream_ended(&stream_key, parse_numeric(&req.duration))
        .await
    {
        Ok(stream) => (
            StatusCode::OK,
            Json(json!({
                "message": "Stream ended",
                "stream_id": stream.id,
                "duration": stream.duration_seconds,
                "status": "ended",
            })),
        )
            .into_response(),
        Err(e) => {
            warn!(%stream_key, error = %e, "could not end stream");
            e.into_response()
        }
    }
}

pub async fn recording_completed(
    State(state): State<AppState>,
    JsonOrForm(req): JsonOrForm<RtmpStreamRequest>,
) -> Response {
    let stream_key = extract_stream_key(&req.name);
    info!(%stream_key, file = %req.file, "recording completed callback");

    let file_size = parse_numeric(&req.size).unwrap_or(0);
    let duration = parse_numeric(&req.duration).unwrap_or(0);

    match state
        .streams
        .recording_completed(&stream_key, &req.file, file_size, duration)
        .await
    {
        Ok(stream) => (
            StatusCode::OK,
            Json(json!({
                "message": "Recording completed",
                "recording_url": stream.recording_url,
                "file_size": file_size,
                "status": "completed",
            })),
        )
            .into_response(),
        Err(e) => {
            warn!(%stream_key, error = %e, "could not update recording info");
            e.into_response()
        }
    }
}

pub async fn stream_info(
    State(state): State<AppState>,
    Path(stream_key): Path<String>,
) -> Response {
    match state.streams.get_stream_info(&stream_key).await {
        Ok((session, Some(stream))) => (
            StatusCode::OK,
            Json(json!({
                "stream_id": stream.id,
                "session": session,
                "status": "active",
            })),
        )
            .into_response(),
        Ok((session, None)) => (
            StatusCode::OK,
            Json(json!({
                "session": session,
                "status": "session_only",
            })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn health() -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "interaction-service",
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().timestamp(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_key_is_last_path_segment() {
        assert_eq!(extract_stream_key("abcdef12"), "abcdef12");
        assert_eq!(extract_stream_key("live/abcdef12"), "abcdef12");
        assert_eq!(extract_stream_key("/live/abcdef12"), "abcdef12");
        assert_eq!(extract_stream_key("  abcdef12  "), "abcdef12");
    }

    #[test]
    fn numeric_fields_tolerate_blank_and_garbage() {
        assert_eq!(parse_numeric("30"), Some(30));
        assert_eq!(parse_numeric(""), None);
        assert_eq!(parse_numeric("abc"), None);
    }
}
