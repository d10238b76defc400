//! K8s readiness probe handler.

use axum::http::StatusCode;
use tokio_util::sync::CancellationToken;

/// Axum-compatible readiness probe. Reports ready until shutdown has been
/// requested, so load balancers stop routing to a draining process.
#[derive(Clone)]
pub struct ReadinessHandler {
    shutdown_token: CancellationToken,
}

impl ReadinessHandler {
    pub(crate) fn new(shutdown_token: CancellationToken) -> Self {
        Self { shutdown_token }
    }

    pub fn is_ready(&self) -> bool {
        !self.shutdown_token.is_cancelled()
    }

    /// No I/O, purely reflects the shutdown token.
    pub async fn check(&self) -> (StatusCode, &'static str) {
        if self.is_ready() {
            (StatusCode::OK, "ready")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "shutting down")
        }
    }
}
