//! Client for the user directory.
//!
//! Primary transport is gRPC; a REST fallback is attempted only when the
//! directory is unreachable over gRPC. An invalid key is a normal result,
//! not an error.

use crate::error::{AppError, AppResult};
use crate::grpc::proto::user::user_service_client::UserServiceClient as TonicUserServiceClient;
use crate::grpc::proto::user::{GetUserRequest, ValidateStreamKeyRequest};
use crate::models::StreamPermissions;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tonic::transport::Channel;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct KeyValidation {
    pub valid: bool,
    pub user_id: i64,
    pub username: String,
    pub permissions: StreamPermissions,
}

impl KeyValidation {
    pub fn invalid() -> Self {
        Self {
            valid: false,
            user_id: 0,
            username: String::new(),
            permissions: StreamPermissions::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn validate_stream_key(
        &self,
        stream_key: &str,
        ip_address: &str,
        app_name: &str,
    ) -> AppResult<KeyValidation>;

    async fn get_user(&self, user_id: &str) -> AppResult<Option<UserProfile>>;
}

#[derive(Clone)]
pub struct UserServiceClient {
    client: TonicUserServiceClient<Channel>,
    http: reqwest::Client,
    http_fallback_url: String,
    request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct HttpValidationResponse {
    valid: bool,
    #[serde(default)]
    user_id: i64,
    #[serde(default)]
    username: String,
}

impl UserServiceClient {
    /// Lazy channel so bootstrap does not block on the directory being up.
    pub fn new(address: &str, http_fallback_url: &str, request_timeout: Duration) -> AppResult<Self> {
        let channel = Channel::from_shared(address.to_string())
            .map_err(|e| AppError::Config(format!("invalid USER_SERVICE_ADDRESS: {e}")))?
            .connect_lazy();

        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AppError::StartServer(format!("http client: {e}")))?;

        Ok(Self {
            client: TonicUserServiceClient::new(channel),
            http,
            http_fallback_url: http_fallback_url.trim_end_matches('/').to_string(),
            request_timeout,
        })
    }

    fn is_transport_error(status: &tonic::Status) -> bool {
        matches!(
            status.code(),
            tonic::Code::Unavailable
                | tonic::Code::DeadlineExceeded
                | tonic::Code::Unimplemented
                | tonic::Code::Unknown
        )
    }

    async fn validate_over_http(
        &self,
        stream_key: &str,
        ip_address: &str,
    ) -> AppResult<KeyValidation> {
        let url = format!("{}/api/v1/stream/validate-stream-key", self.http_fallback_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "stream_key": stream_key,
                "ip_address": ip_address,
            }))
            .send()
            .await
            .map_err(|e| AppError::Unavailable(format!("user directory http: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Unavailable(format!(
                "user directory http status {}",
                response.status()
            )));
        }

        let body: HttpValidationResponse = response
            .json()
            .await
            .map_err(|e| AppError::Unavailable(format!("user directory http body: {e}")))?;

        if !body.valid {
            return Ok(KeyValidation::invalid());
        }
        Ok(KeyValidation {
            valid: true,
            user_id: body.user_id,
            username: body.username,
            permissions: StreamPermissions::default(),
        })
    }
}

#[async_trait]
impl UserDirectory for UserServiceClient {
    async fn validate_stream_key(
        &self,
        stream_key: &str,
        ip_address: &str,
        app_name: &str,
    ) -> AppResult<KeyValidation> {
        let mut client = self.client.clone();
        let mut request = tonic::Request::new(ValidateStreamKeyRequest {
            stream_key: stream_key.to_string(),
            ip_address: ip_address.to_string(),
            app_name: app_name.to_string(),
        });
        request.set_timeout(self.request_timeout);

        match client.validate_stream_key(request).await {
            Ok(response) => {
                let body = response.into_inner();
                if !body.is_valid {
                    return Ok(KeyValidation::invalid());
                }
                Ok(KeyValidation {
                    valid: true,
                    user_id: body.user_id,
                    username: body.username,
                    permissions: StreamPermissions {
                        can_stream: body.can_stream,
                        can_record: body.can_record,
                        max_bitrate: if body.max_bitrate > 0 {
                            body.max_bitrate
                        } else {
                            StreamPermissions::default().max_bitrate
                        },
                        max_duration_minutes: if body.max_duration_minutes > 0 {
                            body.max_duration_minutes
                        } else {
                            StreamPermissions::default().max_duration_minutes
                        },
                    },
                })
            }
            Err(status) if status.code() == tonic::Code::PermissionDenied => {
                Ok(KeyValidation::invalid())
            }
            Err(status) if Self::is_transport_error(&status) => {
                warn!(%stream_key, error = %status, "gRPC validation failed, trying HTTP fallback");
                self.validate_over_http(stream_key, ip_address).await
            }
            Err(status) => Err(AppError::Unavailable(format!(
                "user directory: {}",
                status.message()
            ))),
        }
    }

    async fn get_user(&self, user_id: &str) -> AppResult<Option<UserProfile>> {
        let mut client = self.client.clone();
        let mut request = tonic::Request::new(GetUserRequest {
            user_id: user_id.to_string(),
        });
        request.set_timeout(self.request_timeout);

        match client.get_user(request).await {
            Ok(response) => {
                let body = response.into_inner();
                let succeeded = body.status.as_ref().map(|s| s.success).unwrap_or(false);
                if !succeeded {
                    return Ok(None);
                }
                Ok(body.user.map(|u| UserProfile {
                    id: u.id,
                    username: u.username,
                }))
            }
            Err(status) if status.code() == tonic::Code::NotFound => Ok(None),
            Err(status) => Err(AppError::Unavailable(format!(
                "user directory: {}",
                status.message()
            ))),
        }
    }
}

/// Connection smoke check, logged at startup only.
pub async fn log_directory_reachability(client: &UserServiceClient) {
    match client.get_user("healthcheck").await {
        Ok(_) => info!("user directory reachable over gRPC"),
        Err(e) => warn!(error = %e, "user directory unreachable; HTTP fallback will be used"),
    }
}
