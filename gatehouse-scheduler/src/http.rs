use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use common_metrics::setup_metrics_routes;
use health::HealthRegistry;
use lifecycle::ReadinessHandler;

/// Shared state for the probe router.
#[derive(Clone)]
pub struct AppContext {
    pub name: String,
    pub liveness: HealthRegistry,
    pub readiness: ReadinessHandler,
}

pub async fn listen<F>(app: Router, bind: String, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

async fn index(State(context): State<Arc<AppContext>>) -> String {
    format!("gatehouse scheduler {}", context.name)
}

async fn liveness(State(context): State<Arc<AppContext>>) -> Response {
    context.liveness.get_status().into_response()
}

async fn readiness(State(context): State<Arc<AppContext>>) -> Response {
    context.readiness.check().await.into_response()
}

pub fn app(context: Arc<AppContext>, metrics_enabled: bool) -> Router {
    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(readiness))
        .route("/_liveness", get(liveness))
        .with_state(context);

    // setup_metrics_routes touches global objects, so we need to be able to selectively
    // disable it e.g. for tests
    if metrics_enabled {
        setup_metrics_routes(router)
    } else {
        router
    }
}
