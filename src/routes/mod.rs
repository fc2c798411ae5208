pub mod rtmp;

use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/auth", post(rtmp::authenticate))
        .route("/started", post(rtmp::stream_started))
        .route("/ended", post(rtmp::stream_ended))
        .route("/recorded", post(rtmp::recording_completed))
        .route("/stream/:stream_key", get(rtmp::stream_info))
        .route("/health", get(rtmp::health))
        .route("/metrics", get(crate::metrics::metrics_handler))
        .route("/ws", get(crate::websocket::handlers::ws_handler))
        .with_state(state)
}
