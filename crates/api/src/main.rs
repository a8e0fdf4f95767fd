use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use domain::services::event_bus::{EventBus, InMemoryEventBus};
use domain::services::psp::{MockPspClient, PspClient};

mod app;
mod config;
mod error;
mod extractors;
mod jobs;
mod middleware;
mod routes;
mod services;

use services::bus::{spawn_snapshot_consumer, spawn_trip_ended_consumer, NatsEventBus};
use services::HttpPspClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Load configuration
    let config = config::Config::load()?;

    // Initialize logging
    middleware::logging::init_logging(&config.logging);

    info!(
        region = %config.region.region_id,
        "Starting Ride Hailing API v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Create database pool
    let pool = config.database.create_pool().await?;

    // Run migrations
    info!("Running database migrations...");
    sqlx::migrate!("../persistence/src/migrations").run(&pool).await?;
    info!("Migrations completed");

    // Event bus: NATS when configured, in-memory otherwise
    let nats = if config.bus.nats_url.is_empty() {
        info!("Event bus: in-memory (no NATS URL configured)");
        None
    } else {
        info!(url = %config.bus.nats_url, "Event bus: NATS");
        Some(Arc::new(NatsEventBus::connect(&config.bus.nats_url).await?))
    };
    let bus: Arc<dyn EventBus> = match &nats {
        Some(nats) => Arc::clone(nats) as Arc<dyn EventBus>,
        None => Arc::new(InMemoryEventBus::new()),
    };

    // PSP: HTTP client when configured, mock otherwise
    let psp: Arc<dyn PspClient> = if config.psp.url.is_empty() {
        info!("PSP: mock provider (no URL configured)");
        Arc::new(MockPspClient::new())
    } else {
        info!(url = %config.psp.url, "PSP: HTTP provider");
        Arc::new(HttpPspClient::new(&config.psp)?)
    };

    // Wire engines and shared state
    let state = app::build_state(config.clone(), pool.clone(), bus, psp);

    // Consume trip-ended and supply/demand streams when a broker exists
    if let Some(nats) = &nats {
        spawn_trip_ended_consumer(Arc::clone(nats), Arc::clone(&state.payments));
        spawn_snapshot_consumer(Arc::clone(nats), Arc::clone(&state.surge));
    }

    // Start background jobs
    let mut scheduler = jobs::JobScheduler::new();
    scheduler.register(jobs::OutboxRelayJob::new(
        pool.clone(),
        Arc::clone(&state.bus),
        config.outbox.clone(),
    ));
    scheduler.register(jobs::OfferTimeoutJob::new(
        pool.clone(),
        Arc::clone(&state.dispatch),
        config.dispatch.offer_sweep_interval_secs,
    ));
    scheduler.register(jobs::FailedPaymentSweepJob::new(
        Arc::clone(&state.payments),
        config.reconciler.clone(),
    ));
    scheduler.register(jobs::StalePendingSweepJob::new(
        Arc::clone(&state.payments),
        config.reconciler.clone(),
    ));
    scheduler.start();

    // Build application
    let addr = config.socket_addr();
    let app = app::create_app(state);

    // Start server
    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Handle shutdown gracefully
    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
        info!("Received shutdown signal");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    // Shutdown job scheduler
    scheduler.shutdown();
    scheduler.wait_for_shutdown(Duration::from_secs(30)).await;

    info!("Server shutdown complete");
    Ok(())
}
