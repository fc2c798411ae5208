use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, TextEncoder};

pub static WS_CONNECTED_CLIENTS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "interaction_service_ws_connected_clients",
        "WebSocket clients currently registered with the hub",
    )
    .expect("failed to create interaction_service_ws_connected_clients");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register interaction_service_ws_connected_clients");
    gauge
});

pub static WS_BROADCASTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "interaction_service_ws_broadcasts_total",
            "Messages fanned out by the hub",
        ),
        &["scope"],
    )
    .expect("failed to create interaction_service_ws_broadcasts_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register interaction_service_ws_broadcasts_total");
    counter
});

pub static WS_EVICTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "interaction_service_ws_evictions_total",
        "Clients dropped for a full or closed send queue",
    )
    .expect("failed to create interaction_service_ws_evictions_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register interaction_service_ws_evictions_total");
    counter
});

pub static GRPC_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "interaction_service_grpc_requests_total",
            "gRPC requests handled, by method and status code",
        ),
        &["service", "method", "code"],
    )
    .expect("failed to create interaction_service_grpc_requests_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register interaction_service_grpc_requests_total");
    counter
});

pub async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}
