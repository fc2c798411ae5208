//! Per-request plumbing for the RPC surface: request ids and method timing.

use crate::metrics::GRPC_REQUESTS_TOTAL;
use std::time::Instant;
use tonic::{Request, Status};
use tracing::info;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Attaches a request id when the caller did not send one, so every log
/// line downstream can be correlated.
pub fn request_id_interceptor(mut request: Request<()>) -> Result<Request<()>, Status> {
    if !request.metadata().contains_key(REQUEST_ID_HEADER) {
        let id = uuid::Uuid::new_v4().to_string();
        if let Ok(value) = id.parse() {
            request.metadata_mut().insert(REQUEST_ID_HEADER, value);
        }
    }
    Ok(request)
}

/// Times one RPC; `complete` records the outcome and logs method + duration.
pub struct RequestGuard {
    service: &'static str,
    method: &'static str,
    start: Instant,
}

impl RequestGuard {
    pub fn new(service: &'static str, method: &'static str) -> Self {
        Self {
            service,
            method,
            start: Instant::now(),
        }
    }

    pub fn complete(self, code: tonic::Code) {
        let duration_ms = self.start.elapsed().as_millis() as u64;
        let code_label = format!("{code:?}");
        GRPC_REQUESTS_TOTAL
            .with_label_values(&[self.service, self.method, &code_label])
            .inc();
        info!(
            service = self.service,
            method = self.method,
            code = %code_label,
            duration_ms,
            "rpc handled"
        );
    }
}
