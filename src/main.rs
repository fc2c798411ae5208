use interaction_service::config::Config;
use interaction_service::error::AppError;
use interaction_service::grpc::proto::chat::chat_service_server::ChatServiceServer;
use interaction_service::grpc::proto::stream::stream_service_server::StreamServiceServer;
use interaction_service::grpc::{chat::ChatServiceImpl, middleware, stream::StreamServiceImpl};
use interaction_service::repository::dynamodb::{
    build_client, DynamoChatStore, DynamoStreamStore,
};
use interaction_service::repository::redis::RedisStore;
use interaction_service::repository::HotStore;
use interaction_service::services::events::{EventSink, KinesisEventSink, MockEventSink};
use interaction_service::services::user_client::log_directory_reachability;
use interaction_service::services::{
    ChatService, Reaper, RecordingStore, StreamService, UserServiceClient,
};
use interaction_service::state::AppState;
use interaction_service::websocket::Hub;
use interaction_service::{grpc, logging, routes};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::Server as GrpcServer;
use tracing::{error, info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cfg = Arc::new(Config::from_env()?);
    logging::init_tracing(&cfg.environment);
    info!(environment = %cfg.environment, "starting interaction-service");

    // Durable store. Unreachable stores at bootstrap are fatal.
    let dynamo = build_client(&cfg.dynamodb).await;
    let stream_store = Arc::new(DynamoStreamStore::new(
        dynamo.clone(),
        &cfg.dynamodb.stream_table,
    ));
    let chat_store = Arc::new(DynamoChatStore::new(
        dynamo,
        &cfg.dynamodb.chatroom_table,
        &cfg.dynamodb.message_table,
    ));

    let hot: Arc<dyn HotStore> = Arc::new(
        RedisStore::connect(&cfg.redis.url())
            .await
            .map_err(|e| AppError::StartServer(format!("redis: {e}")))?,
    );

    let users = Arc::new(UserServiceClient::new(
        &cfg.user_service_address,
        &cfg.user_service_http_fallback,
        cfg.grpc_request_timeout,
    )?);
    log_directory_reachability(&users).await;

    // Event and recording sinks are mocked outside production.
    let aws_cfg = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(cfg.dynamodb.region.clone()))
        .load()
        .await;
    let events: Arc<dyn EventSink> = if cfg.is_development() {
        info!("event sink running in mock mode");
        Arc::new(MockEventSink)
    } else {
        Arc::new(KinesisEventSink::new(
            aws_sdk_kinesis::Client::new(&aws_cfg),
            &cfg.kinesis_stream_name,
        ))
    };
    let recordings = Arc::new(if cfg.is_development() {
        RecordingStore::mock(&cfg.s3_bucket_name)
    } else {
        RecordingStore::new(aws_sdk_s3::Client::new(&aws_cfg), &cfg.s3_bucket_name)
    });

    let streams = Arc::new(StreamService::new(
        stream_store.clone(),
        hot.clone(),
        events.clone(),
        users.clone(),
        recordings,
        cfg.operation_timeout,
    ));
    let chat = Arc::new(ChatService::new(
        chat_store,
        hot.clone(),
        users.clone(),
        cfg.operation_timeout,
    ));

    let (stop_tx, stop_rx) = watch::channel(false);
    let hub = Hub::new();

    let state = AppState {
        config: cfg.clone(),
        streams,
        chat,
        hub: hub.clone(),
        users,
        hot: hot.clone(),
        shutdown: stop_rx.clone(),
    };

    // Background reconciliation of streams stuck in `live`.
    let reaper = Reaper::new(stream_store, hot, events);
    let reaper_handle = tokio::spawn(reaper.run(stop_rx.clone()));

    // HTTP + WebSocket server.
    let http_addr = SocketAddr::from(([0, 0, 0, 0], cfg.http_port));
    let listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .map_err(|e| AppError::StartServer(format!("bind {http_addr}: {e}")))?;
    info!(%http_addr, "HTTP listening");

    let app = routes::router(state.clone());
    let mut http_stop = stop_rx.clone();
    let mut http_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = http_stop.changed().await;
            })
            .await
    });

    // gRPC server with reflection.
    let grpc_addr = SocketAddr::from(([0, 0, 0, 0], cfg.grpc_port));
    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(grpc::FILE_DESCRIPTOR_SET)
        .build()
        .map_err(|e| AppError::StartServer(format!("grpc reflection: {e}")))?;

    let stream_svc = InterceptedService::new(
        StreamServiceServer::new(StreamServiceImpl::new(state.clone()))
            .max_decoding_message_size(grpc::MAX_MESSAGE_BYTES)
            .max_encoding_message_size(grpc::MAX_MESSAGE_BYTES),
        middleware::request_id_interceptor,
    );
    let chat_svc = InterceptedService::new(
        ChatServiceServer::new(ChatServiceImpl::new(state.clone()))
            .max_decoding_message_size(grpc::MAX_MESSAGE_BYTES)
            .max_encoding_message_size(grpc::MAX_MESSAGE_BYTES),
        middleware::request_id_interceptor,
    );

    info!(%grpc_addr, "gRPC listening");
    let grpc_timeout = cfg.grpc_request_timeout;
    let mut grpc_stop = stop_rx.clone();
    let mut grpc_handle = tokio::spawn(async move {
        GrpcServer::builder()
            .timeout(grpc_timeout)
            .add_service(reflection)
            .add_service(stream_svc)
            .add_service(chat_svc)
            .serve_with_shutdown(grpc_addr, async move {
                let _ = grpc_stop.changed().await;
            })
            .await
    });

    tokio::select! {
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
        result = &mut http_handle => {
            error!("HTTP server exited: {result:?}");
            let _ = stop_tx.send(true);
            return Err(AppError::StartServer("HTTP server exited unexpectedly".into()));
        }
        result = &mut grpc_handle => {
            error!("gRPC server exited: {result:?}");
            let _ = stop_tx.send(true);
            return Err(AppError::StartServer("gRPC server exited unexpectedly".into()));
        }
    }

    // Stop accepting new work, then drain in-flight requests with a cap.
    let _ = stop_tx.send(true);
    let drain = async {
        let _ = http_handle.await;
        let _ = grpc_handle.await;
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!("servers did not drain within grace period");
    }

    // Close every client queue; writer tasks flush and exit.
    state.hub.close_all().await;
    let _ = reaper_handle.await;

    info!("interaction-service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "could not install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
