// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc, time::Duration};
use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::fleet_service::FleetService;
use crate::domain::view_mode::ViewMode;
use crate::infrastructure::config::load_config;
use crate::infrastructure::fleet_api::FleetApiRepository;
use crate::infrastructure::osrm_router::OsrmRouter;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    best_route, cluster_children, cluster_leaves, dispatch_technician, expansion_zoom,
    fleet_summary, get_mode, heal_station, health_check, list_alerts, list_clusters, list_events,
    list_routes, list_service_centers, list_stations, maintenance_queue, nearest_stations,
    refresh_stations, retrain_model, set_mode, stream_alerts, stress_station,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = load_config()?;

    // Collaborators (infrastructure layer)
    let repository = Arc::new(FleetApiRepository::new(
        &config.fleet_api.base_url,
        Duration::from_secs(config.fleet_api.timeout_secs),
    )?);
    let router = Arc::new(OsrmRouter::new(
        &config.routing.base_url,
        &config.routing.profile,
        Duration::from_secs(config.routing.timeout_secs),
    )?);

    // Live engine (application layer)
    let fleet = Arc::new(FleetService::new(
        repository,
        router,
        config.clustering.clone(),
        config.polling.interval(),
    ));

    // First load; an unreachable backend only means an empty map until the next refresh
    if let Err(e) = fleet.refresh().await {
        tracing::warn!("initial station load failed: {}", e);
    }
    if config.polling.start_live {
        fleet.set_mode(ViewMode::default()).await;
    }

    let state = Arc::new(AppState {
        fleet: fleet.clone(),
    });

    // Build router (presentation layer)
    // Note: compression is decided per response in the handlers,
    // so there is no CompressionLayer here
    let app = Router::new()
        .route("/healthz", get(health_check))
        .route("/stations", get(list_stations))
        .route("/stations/refresh", post(refresh_stations))
        .route("/stations/:id/heal", post(heal_station))
        .route("/stations/:id/stress", post(stress_station))
        .route("/stations/:id/dispatch", post(dispatch_technician))
        .route("/clusters", get(list_clusters))
        .route("/clusters/:id/expansion-zoom", get(expansion_zoom))
        .route("/clusters/:id/children", get(cluster_children))
        .route("/clusters/:id/leaves", get(cluster_leaves))
        .route("/nearest", get(nearest_stations))
        .route("/routes", get(list_routes))
        .route("/routes/best", post(best_route))
        .route("/model/retrain", post(retrain_model))
        .route("/service-centers", get(list_service_centers))
        .route("/maintenance", get(maintenance_queue))
        .route("/summary", get(fleet_summary))
        .route("/events", get(list_events))
        .route("/alerts", get(list_alerts))
        .route("/alerts/stream", get(stream_alerts))
        .route("/mode", get(get_mode).put(set_mode))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid server.bind address {}", config.server.bind))?;
    tracing::info!("Starting fleet-pulse service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    fleet.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        // Serve until killed rather than stopping right away.
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
