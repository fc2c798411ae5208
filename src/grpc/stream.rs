use crate::error::AppError;
use crate::grpc::middleware::RequestGuard;
use crate::grpc::proto::stream::stream_service_server::StreamService;
use crate::grpc::proto::stream::*;
use crate::grpc::{error_status, ok_status, stream_status_from_proto, stream_to_proto};
use crate::services::StreamUpdate;
use crate::state::AppState;
use tonic::{Request, Response, Status};

const SERVICE: &str = "StreamService";

/// Business failures travel inside the `status` envelope with
/// `success=false`; the transport-level `Status` is reserved for failures
/// of the call itself.
#[derive(Clone)]
pub struct StreamServiceImpl {
    state: AppState,
}

impl StreamServiceImpl {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[tonic::async_trait]
impl StreamService for StreamServiceImpl {
    async fn validate_stream_key(
        &self,
        request: Request<ValidateStreamKeyRequest>,
    ) -> Result<Response<ValidateStreamKeyResponse>, Status> {
        let guard = RequestGuard::new(SERVICE, "ValidateStreamKey");
        let req = request.into_inner();

        let response = match self
            .state
            .streams
            .validate_key(&req.stream_key, &req.ip_address, &req.app_name)
            .await
        {
            Ok(validation) if validation.valid => {
                guard.complete(tonic::Code::Ok);
                ValidateStreamKeyResponse {
                    status: Some(ok_status("Stream key validated successfully")),
                    is_valid: true,
                    user_id: validation.user_id,
                    username: validation.username,
                    permissions: Some(StreamPermissions {
                        can_stream: validation.permissions.can_stream,
                        can_record: validation.permissions.can_record,
                        max_bitrate: validation.permissions.max_bitrate,
                        max_duration_minutes: validation.permissions.max_duration_minutes,
                    }),
                }
            }
            Ok(_) => {
                let err = AppError::PermissionDenied("invalid stream key".into());
                guard.complete(err.grpc_code());
                ValidateStreamKeyResponse {
                    status: Some(error_status(&err)),
                    ..Default::default()
                }
            }
            Err(err) => {
                guard.complete(err.grpc_code());
                ValidateStreamKeyResponse {
                    status: Some(error_status(&err)),
                    ..Default::default()
                }
            }
        };
        Ok(Response::new(response))
    }

    async fn create_stream(
        &self,
        request: Request<CreateStreamRequest>,
    ) -> Result<Response<CreateStreamResponse>, Status> {
        let guard = RequestGuard::new(SERVICE, "CreateStream");
        let req = request.into_inner();

        let mut metadata = std::collections::HashMap::new();
        if let Some(meta) = &req.metadata {
            if !meta.client_ip.is_empty() {
                metadata.insert("client_ip".to_string(), meta.client_ip.clone());
            }
            if !meta.app_name.is_empty() {
                metadata.insert("app_name".to_string(), meta.app_name.clone());
            }
            if meta.bitrate > 0 {
                metadata.insert("bitrate".to_string(), meta.bitrate.to_string());
            }
            if !meta.resolution.is_empty() {
                metadata.insert("resolution".to_string(), meta.resolution.clone());
            }
            if !meta.codec.is_empty() {
                metadata.insert("codec".to_string(), meta.codec.clone());
            }
        }

        let response = match self
            .state
            .streams
            .create_stream(req.user_id, &req.stream_key, &req.title, metadata)
            .await
        {
            Ok(stream) => {
                guard.complete(tonic::Code::Ok);
                CreateStreamResponse {
                    status: Some(ok_status("Stream created successfully")),
                    stream_id: stream.id.clone(),
                    stream: Some(stream_to_proto(&stream)),
                }
            }
            Err(err) => {
                guard.complete(err.grpc_code());
                CreateStreamResponse {
                    status: Some(error_status(&err)),
                    ..Default::default()
                }
            }
        };
        Ok(Response::new(response))
    }

    async fn update_stream(
        &self,
        request: Request<UpdateStreamRequest>,
    ) -> Result<Response<UpdateStreamResponse>, Status> {
        let guard = RequestGuard::new(SERVICE, "UpdateStream");
        let req = request.into_inner();

        // Proto3 zero values mean "not provided": STREAM_PENDING is never a
        // forward transition and counts of zero are not observable here.
        let status = StreamStatus::try_from(req.status)
            .ok()
            .filter(|s| *s != StreamStatus::StreamPending)
            .map(stream_status_from_proto);
        let update = StreamUpdate {
            status,
            viewer_count: (req.viewer_count > 0).then_some(req.viewer_count),
            duration_seconds: (req.duration_seconds > 0).then_some(req.duration_seconds),
            recording_url: None,
        };

        let response = match self.state.streams.update_stream(&req.stream_id, update).await {
            Ok(stream) => {
                guard.complete(tonic::Code::Ok);
                UpdateStreamResponse {
                    status: Some(ok_status("Stream updated successfully")),
                    stream: Some(stream_to_proto(&stream)),
                }
            }
            Err(err) => {
                guard.complete(err.grpc_code());
                UpdateStreamResponse {
                    status: Some(error_status(&err)),
                    ..Default::default()
                }
            }
        };
        Ok(Response::new(response))
    }

    async fn get_stream(
        &self,
        request: Request<GetStreamRequest>,
    ) -> Result<Response<GetStreamResponse>, Status> {
        let guard = RequestGuard::new(SERVICE, "GetStream");
        let req = request.into_inner();

        let response = match self.state.streams.get_stream(&req.stream_id).await {
            Ok(stream) => {
                guard.complete(tonic::Code::Ok);
                GetStreamResponse {
                    status: Some(ok_status("Stream retrieved successfully")),
                    stream: Some(stream_to_proto(&stream)),
                }
            }
            Err(err) => {
                guard.complete(err.grpc_code());
                GetStreamResponse {
                    status: Some(error_status(&err)),
                    ..Default::default()
                }
            }
        };
        Ok(Response::new(response))
    }

    async fn get_active_streams(
        &self,
        _request: Request<GetActiveStreamsRequest>,
    ) -> Result<Response<GetActiveStreamsResponse>, Status> {
        let guard = RequestGuard::new(SERVICE, "GetActiveStreams");

        let response = match self.state.streams.get_active_streams().await {
            Ok(streams) => {
                guard.complete(tonic::Code::Ok);
                let wire: Vec<_> = streams.iter().map(stream_to_proto).collect();
                GetActiveStreamsResponse {
                    status: Some(ok_status("Active streams retrieved successfully")),
                    total_count: wire.len() as i32,
                    streams: wire,
                }
            }
            Err(err) => {
                guard.complete(err.grpc_code());
                GetActiveStreamsResponse {
                    status: Some(error_status(&err)),
                    ..Default::default()
                }
            }
        };
        Ok(Response::new(response))
    }

    async fn end_stream(
        &self,
        request: Request<EndStreamRequest>,
    ) -> Result<Response<EndStreamResponse>, Status> {
        let guard = RequestGuard::new(SERVICE, "EndStream");
        let req = request.into_inner();

        let duration = (req.duration_seconds > 0).then_some(req.duration_seconds);
        let recording = (!req.recording_path.is_empty()).then_some(req.recording_path.as_str());

        let response = match self
            .state
            .streams
            .end_stream_by_id(&req.stream_id, duration, recording)
            .await
        {
            Ok(_) => {
                guard.complete(tonic::Code::Ok);
                EndStreamResponse {
                    status: Some(ok_status("Stream ended successfully")),
                }
            }
            Err(err) => {
                guard.complete(err.grpc_code());
                EndStreamResponse {
                    status: Some(error_status(&err)),
                }
            }
        };
        Ok(Response::new(response))
    }

    async fn recording_completed(
        &self,
        request: Request<RecordingCompletedRequest>,
    ) -> Result<Response<RecordingCompletedResponse>, Status> {
        let guard = RequestGuard::new(SERVICE, "RecordingCompleted");
        let req = request.into_inner();

        let result = match self.state.streams.get_stream(&req.stream_id).await {
            Ok(stream) => {
                self.state
                    .streams
                    .recording_completed(
                        &stream.stream_key,
                        &req.recording_path,
                        req.file_size_bytes,
                        req.duration_seconds,
                    )
                    .await
            }
            Err(err) => Err(err),
        };

        let response = match result {
            Ok(stream) => {
                guard.complete(tonic::Code::Ok);
                RecordingCompletedResponse {
                    status: Some(ok_status("Recording info updated successfully")),
                    recording_url: stream.recording_url.unwrap_or_default(),
                }
            }
            Err(err) => {
                guard.complete(err.grpc_code());
                RecordingCompletedResponse {
                    status: Some(error_status(&err)),
                    ..Default::default()
                }
            }
        };
        Ok(Response::new(response))
    }
}
