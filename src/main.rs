//! sitewatch server entry point.
//!
//! Starts the scheduler and the Axum HTTP server.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use sitewatch::api;
use sitewatch::app_state::AppState;
use sitewatch::clock::SystemClock;
use sitewatch::config::MonitorConfig;
use sitewatch::domain::EventBus;
use sitewatch::fetch::{HttpFetcher, PreviewSummarizer};
use sitewatch::persistence::{PostgresPersistence, spawn_event_log};
use sitewatch::service::{MonitorPolicy, MonitorService, Scheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = MonitorConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    tracing::info!(addr = %config.listen_addr, "starting sitewatch");

    // Build service layer
    let event_bus = EventBus::new(config.event_bus_capacity);
    let fetcher = HttpFetcher::new(Duration::from_secs(config.fetch_timeout_secs))?;
    let mut service = MonitorService::new(
        MonitorPolicy::from(&config),
        Arc::new(fetcher),
        Arc::new(PreviewSummarizer),
        Arc::new(SystemClock),
        event_bus.clone(),
    );

    // Hydrate from PostgreSQL
    let mut event_log = None;
    if config.persistence_enabled {
        let persistence = PostgresPersistence::connect(&config).await?;
        let state = persistence.load_state().await?;
        service = service.with_persistence(persistence.clone());
        service.restore(state).await;
        if config.event_log_enabled {
            event_log = Some(spawn_event_log(persistence, &event_bus));
        }
    } else {
        tracing::info!("persistence disabled, state is kept in memory only");
    }
    let monitor = Arc::new(service);

    // Start scheduler
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Scheduler::new(Arc::clone(&monitor), config.scheduler_tick());
    let scheduler_task = tokio::spawn(async move {
        let mut rx = shutdown_rx;
        scheduler
            .run(async move {
                let _ = rx.changed().await;
            })
            .await;
    });

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState::new(monitor));

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    scheduler_task.await?;
    if let Some(task) = event_log {
        task.abort();
    }
    Ok(())
}
