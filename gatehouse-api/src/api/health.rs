use axum::extract::State;
use axum::Json;
use gatehouse_core::checker::HealthReport;

use crate::router::AppState;

/// Dependency round-trip report. Always a 200; the verdict is in the body so
/// an unhealthy database still produces a readable report.
pub async fn healthcheck(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.checker.check_dependencies().await)
}
