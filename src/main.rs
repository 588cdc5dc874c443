use diesel::Connection;
use diesel_async::async_connection_wrapper::AsyncConnectionWrapper;
use diesel_async::AsyncPgConnection;
use diesel_migrations::MigrationHarness;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use promopost::app;
use promopost::app_config;
use promopost::db::{mask_connection_string, MIGRATIONS};
use promopost::handlers;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = app_config::config();
    info!(
        environment = ?config.environment,
        database = %mask_connection_string(&config.database_url),
        "Starting promopost service"
    );

    run_migrations(&config.database_url).await?;

    let app = app::initialize(config).await?;

    tokio::spawn({
        let scheduler = app.scheduler;
        async move { scheduler.run().await }
    });
    tokio::spawn({
        let refund_monitor = app.refund_monitor;
        async move { refund_monitor.run().await }
    });
    tokio::spawn({
        let cleanup = app.cleanup;
        async move { cleanup.run().await }
    });

    let router = handlers::router(app.state).layer(tower_http::trace::TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

/// Apply pending migrations on a blocking thread; diesel's migration
/// harness is synchronous.
async fn run_migrations(database_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let url = database_url.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = AsyncConnectionWrapper::<AsyncPgConnection>::establish(&url)
            .map_err(|e| format!("could not connect for migrations: {}", e))?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| format!("migrations failed: {}", e))?;
        if !applied.is_empty() {
            info!(count = applied.len(), "Applied database migrations");
        }
        Ok::<(), String>(())
    })
    .await??;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install shutdown handler");
    }
    info!("Shutdown signal received");
}
