use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use envconfig::Envconfig;
use lifecycle::{Runner, ShutdownOutcome};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use gatehouse_api::config::Config;
use gatehouse_api::router::router;
use gatehouse_api::server::serve;
use gatehouse_core::auth::repository::{PgTokenRepository, TokenRepository};
use gatehouse_core::auth::service::AuthService;
use gatehouse_core::checker::DependencyChecker;
use gatehouse_core::diagnostics::DiagnosticsToggle;
use gatehouse_core::settings::{ProcessKind, SettingsProvider};
use gatehouse_core::users::repository::{PgUserRepository, UserRepository};
use gatehouse_core::users::service::UserService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::init_from_env().context("invalid configuration")?;

    // The settings document is read before tracing comes up so the process
    // debug flag can raise the default level.
    let settings = SettingsProvider::load(&config.settings_path)
        .context("failed to load the settings document")?;

    let default_level = if settings.current().debug_for(ProcessKind::Api) {
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

    let runner = Runner::new("gatehouse-api");

    let document = settings.current();
    let pool = common_database::get_pool(&document.database.dsn, document.database.max_connections)
        .await
        .context("failed to open the database pool")?;

    let tokens: Arc<dyn TokenRepository> = Arc::new(PgTokenRepository::new(pool.clone()));
    let users: Arc<dyn UserRepository> = Arc::new(PgUserRepository::new(pool.clone()));
    let auth = Arc::new(AuthService::new(tokens, Arc::clone(&users)));
    let directory = Arc::new(UserService::new(users));
    let checker = Arc::new(DependencyChecker::new(pool.clone()));

    let toggle = Arc::new(DiagnosticsToggle::new(
        ProcessKind::Api,
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

    let app = router(
        auth,
        directory,
        checker,
        runner.readiness_handler(),
        config.export_prometheus,
    );

    let address = SocketAddr::new(config.host, document.api.port);
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    serve(app, listener, runner.shutdown_requested()).await;

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
