//! Roster service entry point.
//!
//! Wires configuration, the database pool, the metrics recorder, the
//! fan-out worker, and the Axum server with graceful shutdown.

use anyhow::Context;
use roster_service::config::Config;
use roster_service::observability::metrics::init_metrics_recorder;
use roster_service::observability::BackfillTrail;
use roster_service::repositories::PgCandidatePool;
use roster_service::routes::{self, AppState};
use roster_service::services::TimelinePublisher;
use roster_service::tasks::{run_fanout_worker, FanoutConfig, FanoutHandle, FANOUT_QUEUE_DEPTH};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roster_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting roster service");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    info!(
        bind_address = %config.bind_address,
        jwt_clock_skew_seconds = config.jwt_clock_skew_seconds,
        realtime = config.realtime_url.is_some(),
        webhook = config.timeline_webhook_url.is_some(),
        "Configuration loaded successfully"
    );

    // Initialize database connection pool
    info!("Connecting to database...");
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    info!("Database connection established");

    // Install the Prometheus recorder before anything records a metric.
    let metrics_handle = init_metrics_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics recorder: {e}"))?;

    // Fan-out worker: bounded queue, graceful shutdown via token.
    let cancel_token = CancellationToken::new();
    let (fanout_handle, fanout_rx) = FanoutHandle::channel(FANOUT_QUEUE_DEPTH);
    let fanout_worker = tokio::spawn(run_fanout_worker(
        FanoutConfig::from_config(&config),
        fanout_rx,
        cancel_token.clone(),
    ));

    let bind_address = config.bind_address.clone();
    let backfill_trail_capacity = config.backfill_trail_capacity;

    let state = Arc::new(AppState {
        pool: pool.clone(),
        config,
        candidates: Arc::new(PgCandidatePool::new(pool.clone())),
        timeline: TimelinePublisher::new(pool, fanout_handle),
        backfill_trail: Arc::new(BackfillTrail::new(backfill_trail_capacity)),
    });

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address
        .parse()
        .context("Invalid bind address")?;

    info!("Roster service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind listener")?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    // Stop the fan-out worker after the server drains.
    cancel_token.cancel();
    if let Err(e) = fanout_worker.await {
        error!("Fan-out worker join failed: {}", e);
    }

    info!("Roster service shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
