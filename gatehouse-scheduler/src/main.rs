use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use envconfig::Envconfig;
use health::HealthRegistry;
use lifecycle::{Runner, ShutdownOutcome};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use gatehouse_core::auth::repository::{PgTokenRepository, TokenRepository};
use gatehouse_core::auth::service::AuthService;
use gatehouse_core::checker::DependencyChecker;
use gatehouse_core::diagnostics::DiagnosticsToggle;
use gatehouse_core::settings::{ProcessKind, SettingsProvider};
use gatehouse_core::users::repository::{PgUserRepository, UserRepository};
use gatehouse_scheduler::config::Config;
use gatehouse_scheduler::http::{app, listen, AppContext};
use gatehouse_scheduler::jobs::{run_health_check, run_token_cleanup, JobDefinition, Scheduler};

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);
const TOKEN_CLEANUP_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::init_from_env().context("invalid configuration")?;

    // The settings document is read before tracing comes up so the process
    // debug flag can raise the default level.
    let settings = SettingsProvider::load(&config.settings_path)
        .context("failed to load the settings document")?;

    let default_level = if settings.current().debug_for(ProcessKind::Scheduler) {
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

    let runner = Runner::new("gatehouse-scheduler");

    let document = settings.current();
    let pool = common_database::get_pool(&document.database.dsn, document.database.max_connections)
        .await
        .context("failed to open the database pool")?;

    let tokens: Arc<dyn TokenRepository> = Arc::new(PgTokenRepository::new(pool.clone()));
    let users: Arc<dyn UserRepository> = Arc::new(PgUserRepository::new(pool.clone()));
    let auth = Arc::new(AuthService::new(tokens, users));
    let checker = Arc::new(DependencyChecker::new(pool.clone()));

    let toggle = Arc::new(DiagnosticsToggle::new(
        ProcessKind::Scheduler,
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

    let schedules = &document.scheduler.jobs;
    let health_job = JobDefinition::new("health_check", &schedules.health_check, HEALTH_CHECK_TIMEOUT)?;
    let cleanup_job =
        JobDefinition::new("token_cleanup", &schedules.token_cleanup, TOKEN_CLEANUP_TIMEOUT)?;

    let liveness = HealthRegistry::new("liveness");
    let health_handle = liveness
        .register("health_check".to_string(), health_job.liveness_deadline())
        .await;
    let cleanup_handle = liveness
        .register("token_cleanup".to_string(), cleanup_job.liveness_deadline())
        .await;

    let scheduler = Scheduler::new(runner.shutdown_token());
    scheduler.register(health_job, health_handle, {
        let checker = Arc::clone(&checker);
        move || run_health_check(Arc::clone(&checker))
    });
    scheduler.register(cleanup_job, cleanup_handle, {
        let auth = Arc::clone(&auth);
        move || run_token_cleanup(Arc::clone(&auth))
    });
    runner.set_drain("scheduled jobs", {
        let scheduler = scheduler.clone();
        move || async move {
            scheduler.drain().await;
            Ok(())
        }
    });

    let context = Arc::new(AppContext {
        name: document.scheduler.name.clone(),
        liveness,
        readiness: runner.readiness_handler(),
    });
    let bind = format!("{}:{}", config.host, document.scheduler.port);
    listen(
        app(context, config.export_prometheus),
        bind,
        runner.shutdown_requested(),
    )
    .await
    .context("probe server failed")?;

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
