use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether a caller may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Unavailable(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) => StatusCode::FORBIDDEN,
            AppError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyExists(_) => StatusCode::CONFLICT,
            AppError::FailedPrecondition(_) => StatusCode::CONFLICT,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn grpc_code(&self) -> tonic::Code {
        match self {
            AppError::InvalidArgument(_) => tonic::Code::InvalidArgument,
            AppError::Unauthenticated(_) => tonic::Code::Unauthenticated,
            AppError::PermissionDenied(_) => tonic::Code::PermissionDenied,
            AppError::NotFound(_) => tonic::Code::NotFound,
            AppError::AlreadyExists(_) => tonic::Code::AlreadyExists,
            AppError::FailedPrecondition(_) => tonic::Code::FailedPrecondition,
            AppError::Unavailable(_) => tonic::Code::Unavailable,
            _ => tonic::Code::Internal,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<AppError> for tonic::Status {
    fn from(err: AppError) -> Self {
        tonic::Status::new(err.grpc_code(), err.to_string())
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Unavailable(format!("redis: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("serialization: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_only_for_unavailable() {
        assert!(AppError::Unavailable("redis down".into()).is_retryable());
        assert!(!AppError::NotFound("stream".into()).is_retryable());
        assert!(!AppError::Internal("bug".into()).is_retryable());
    }

    #[test]
    fn grpc_codes_match_taxonomy() {
        assert_eq!(
            AppError::PermissionDenied("not a member".into()).grpc_code(),
            tonic::Code::PermissionDenied
        );
        assert_eq!(
            AppError::AlreadyExists("member".into()).grpc_code(),
            tonic::Code::AlreadyExists
        );
        assert_eq!(
            AppError::FailedPrecondition("not live".into()).grpc_code(),
            tonic::Code::FailedPrecondition
        );
    }
}
