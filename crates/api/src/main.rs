use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use domain::services::{Dispatcher, DispatcherSettings};
use watchparty_api::app::{self, AppState, Repositories};
use watchparty_api::config::Config;
use watchparty_api::jobs::{
    AuditCleanupJob, DispatchWorkerPool, JobScheduler, NotifyQueue, PoolMetricsJob,
};
use watchparty_api::middleware::{self, init_metrics};
use watchparty_api::services::EmailService;

/// How long background workers get to finish after the server stops.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load().context("Failed to load configuration")?;

    middleware::logging::init_logging(&config.logging);
    init_metrics().context("Failed to install metrics recorder")?;

    info!("Starting Watch Party API v{}", env!("CARGO_PKG_VERSION"));

    let db_config: persistence::db::DatabaseConfig = (&config.database).into();
    let pool = persistence::db::create_pool(&db_config).await?;

    info!("Running database migrations...");
    persistence::db::run_migrations(&pool).await?;
    info!("Migrations completed");

    let repos = Repositories::postgres(&pool);
    let queue = Arc::new(NotifyQueue::new());

    let mail = EmailService::new(config.email.clone())?;
    if !mail.is_enabled() {
        info!("Email sending is disabled; dispatch jobs will complete without mail");
    }
    let dispatcher = Dispatcher::new(
        repos.dispatch.clone(),
        repos.notifications.clone(),
        repos.identities.clone(),
        Arc::new(mail),
        app::templates(&config.email),
        DispatcherSettings {
            retry: config.dispatch.retry_policy(),
            attempt_timeout: config.dispatch.attempt_timeout(),
        },
    )
    .with_span(tracing::info_span!("dispatcher"));

    let mut scheduler = JobScheduler::new();
    scheduler.register(PoolMetricsJob::new(pool.clone()));
    scheduler.register(AuditCleanupJob::new(
        repos.dispatch.clone(),
        config.dispatch.audit_retention_days,
    ));
    scheduler.start();
    DispatchWorkerPool::new(Arc::new(dispatcher), queue.clone(), &config.dispatch)
        .start(&mut scheduler);

    let addr = config.socket_addr()?;
    let state = AppState::new(config, Some(pool), &repos, queue.clone())?;
    let app = app::create_app(state);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, draining background workers");
    queue.close();
    scheduler.shutdown();
    scheduler.wait_for_shutdown(SHUTDOWN_GRACE).await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
