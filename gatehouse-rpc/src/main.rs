use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use common_metrics::setup_metrics_routes;
use envconfig::Envconfig;
use gatehouse_proto::gatehouse::v1::health_service_server::HealthServiceServer;
use lifecycle::{Runner, ShutdownOutcome};
use tonic::transport::Server;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use gatehouse_core::checker::DependencyChecker;
use gatehouse_core::diagnostics::DiagnosticsToggle;
use gatehouse_core::settings::{ProcessKind, SettingsProvider};
use gatehouse_rpc::config::Config;
use gatehouse_rpc::service::GrpcHealthService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::init_from_env().context("invalid configuration")?;

    let settings = SettingsProvider::load(&config.settings_path)
        .context("failed to load the settings document")?;

    let default_level = if settings.current().debug_for(ProcessKind::Rpc) {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let log_layer = tracing_subscriber::fmt::layer().with_filter(
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy(),
    );
    tracing_subscriber::registry().with(log_layer).init();

    settings
        .watch()
        .context("failed to watch the settings document")?;

    let runner = Runner::new("gatehouse-rpc");

    let document = settings.current();
    let pool = common_database::get_pool(&document.database.dsn, document.database.max_connections)
        .await
        .context("failed to open the database pool")?;
    let checker = Arc::new(DependencyChecker::new(pool.clone()));

    // Probe and metrics sidecar. Bind and serve failures are logged, never
    // fatal to the gRPC server.
    let readiness = runner.readiness_handler();
    let readiness_probe = move || {
        let handler = readiness.clone();
        async move { handler.check().await }
    };
    let probe_router = Router::new()
        .route("/_readiness", get(readiness_probe))
        .route("/_liveness", get(|| async { "ok" }));
    let probe_router = setup_metrics_routes(probe_router);

    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        let bind = format!("0.0.0.0:{metrics_port}");
        match tokio::net::TcpListener::bind(&bind).await {
            Ok(listener) => {
                tracing::info!("metrics server listening on {bind}");
                if let Err(error) = axum::serve(listener, probe_router).await {
                    tracing::error!("metrics server failed: {error}");
                }
            }
            Err(error) => tracing::error!("failed to bind metrics port {bind}: {error}"),
        }
    });

    let toggle = Arc::new(DiagnosticsToggle::new(
        ProcessKind::Rpc,
        settings.clone(),
        pool.clone(),
    ));
    tokio::spawn({
        let toggle = Arc::clone(&toggle);
        let shutdown = runner.shutdown_token();
        async move { toggle.run(shutdown).await }
    });

    runner.register_cleanup("settings watcher", {
        let settings = settings.clone();
        move || async move {
            settings.unwatch();
            Ok(())
        }
    });
    runner.register_cleanup("database pool", {
        let pool = pool.clone();
        move || async move {
            pool.close().await;
            Ok(())
        }
    });

    let service = GrpcHealthService::new(checker);
    let address = SocketAddr::new(config.host, document.rpc.port);
    tracing::info!("gRPC server listening on {address}");

    Server::builder()
        .add_service(HealthServiceServer::new(service))
        .serve_with_shutdown(address, runner.shutdown_requested())
        .await
        .context("gRPC server failed")?;

    match runner.shutdown().await {
        ShutdownOutcome::Clean { elapsed } => {
            tracing::info!(?elapsed, "shutdown complete");
        }
        ShutdownOutcome::CleanWithErrors { elapsed, failures } => {
            tracing::warn!(?elapsed, ?failures, "shutdown finished with failed obligations");
        }
        ShutdownOutcome::Forced { elapsed, pending } => {
            tracing::warn!(?elapsed, ?pending, "shutdown deadline exceeded, abandoning pending work");
        }
    }

    Ok(())
}
