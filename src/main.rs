//! fanride-backend server entry point.
//!
//! Starts the Axum HTTP server with REST, hub, and background services.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::sync::{broadcast, watch};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use fanride_backend::api;
use fanride_backend::app_state::AppState;
use fanride_backend::config::{ChangeFeedMode, FanRideConfig};
use fanride_backend::domain::HubEvent;
use fanride_backend::service::read_model::ReadModelContainers;
use fanride_backend::service::{EventStore, IngestWorker, Projector, ReadModelService};
use fanride_backend::store::{
    ChangeFeedProcessor, DocumentStore, MemoryStore, StartMode,
};
use fanride_backend::ws::handler::hub_handler;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration; validation failures are fatal.
    let config = FanRideConfig::from_env()?;
    tracing::info!(addr = %config.listen_addr, "starting fanride-backend");

    // Shared store client, held for the process lifetime.
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let containers = &config.cosmos.containers;

    // Build services
    let event_store = Arc::new(EventStore::new(Arc::clone(&store), containers.es.clone()));
    let read_models = Arc::new(ReadModelService::new(
        Arc::clone(&store),
        ReadModelContainers {
            match_state: containers.rm_match_state.clone(),
            tes_history: containers.rm_tes_history.clone(),
            leaderboard: containers.rm_leaderboard.clone(),
        },
    ));
    let (hub, _) = broadcast::channel::<HubEvent>(config.hub_bus_capacity);

    // Process-wide shutdown signal; background services finish their
    // current iteration before exiting.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Change-feed projector
    let projector = Arc::new(Projector::new(
        Arc::clone(&store),
        containers.es.clone(),
        containers.rm_match_state.clone(),
        containers.rm_tes_history.clone(),
        containers.rm_leaderboard.clone(),
        ReadModelService::new(
            Arc::clone(&store),
            ReadModelContainers {
                match_state: containers.rm_match_state.clone(),
                tes_history: containers.rm_tes_history.clone(),
                leaderboard: containers.rm_leaderboard.clone(),
            },
        ),
        hub.clone(),
    ));
    let start_mode = match config.change_feed_mode {
        ChangeFeedMode::Live => StartMode::FromNow,
        ChangeFeedMode::Rebuild => StartMode::FromBeginning,
    };
    let processor = ChangeFeedProcessor::new(
        Arc::clone(&store),
        containers.es.clone(),
        containers.leases.clone(),
        "fanride-projector",
        format!("instance-{}", uuid::Uuid::new_v4()),
        start_mode,
    );
    if config.change_feed_mode == ChangeFeedMode::Rebuild {
        processor.purge_leases().await?;
    }
    tokio::spawn(processor.run(projector, shutdown_rx.clone()));

    // Feed ingestion worker
    if config.afl_feed.enabled {
        let worker = IngestWorker::new(
            config.afl_feed.clone(),
            EventStore::new(Arc::clone(&store), containers.es.clone()),
            hub.clone(),
        )?;
        tokio::spawn(worker.run(shutdown_rx.clone()));
    }

    // Build application state
    let app_state = AppState {
        store,
        event_store,
        read_models,
        hub,
        es_container: containers.es.clone(),
    };

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .route("/hub/match", get(hub_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server with graceful shutdown on ctrl-c.
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    Ok(())
}
