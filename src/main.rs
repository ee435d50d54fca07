// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post, put},
};
use tokio::sync::broadcast;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use crate::application::dashboard_store::{DashboardStore, spawn_auto_refresh};
use crate::application::mutation_queue::DraftMutationQueue;
use crate::application::tile_cache::{KeyValueStore, MemoryStore, TileCache};
use crate::application::tile_resolver::TileDataResolver;
use crate::domain::error::describe_error;
use crate::infrastructure::config::load_app_config;
use crate::infrastructure::file_store::FileStore;
use crate::infrastructure::metrics_client::MetricsClient;
use crate::infrastructure::visuals_client::VisualsClient;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = load_app_config()?;

    // Initialize tracing; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Create repositories (infrastructure layer)
    let metrics = Arc::new(MetricsClient::new(config.metrics.base_url.clone()));
    let drafts = Arc::new(VisualsClient::new(
        config.visuals.base_url.clone(),
        config.visuals.auth_token.clone(),
        config.visuals.client_id.clone(),
    ));
    let cache_store: Arc<dyn KeyValueStore> = match &config.cache.dir {
        Some(dir) => Arc::new(FileStore::open(dir)?),
        None => Arc::new(MemoryStore::new()),
    };

    // Create services (application layer)
    let queue = DraftMutationQueue::with_delays(
        drafts,
        config.editor.layout_debounce(),
        config.editor.metadata_debounce(),
    );
    let resolver = TileDataResolver::new(metrics.clone(), TileCache::new(cache_store));
    let mut draft_events = queue.subscribe();
    let store = Arc::new(DashboardStore::new(metrics, queue, resolver));

    tokio::spawn(async move {
        loop {
            let event = match draft_events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Skipped {} draft status events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            match &event.state.error {
                Some(error) => tracing::warn!("Draft {} error: {}", event.dashboard_id, error),
                None => tracing::debug!(
                    "Draft {} {:?} ({} in flight)",
                    event.dashboard_id,
                    event.state.status,
                    event.state.in_flight
                ),
            }
        }
    });

    // The page status already carries the failure; keep serving so it can be retried.
    if let Err(e) = store.load().await {
        tracing::warn!("Initial load failed: {}", describe_error(&e, "load failed"));
    }
    if let Some(every) = config.editor.auto_refresh() {
        tracing::info!("Auto-refresh every {:?}", every);
        spawn_auto_refresh(store.clone(), every);
    }

    let state = Arc::new(AppState { store });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(handlers::health_check))
        .route("/state", get(handlers::get_state))
        .route("/catalog", get(handlers::get_catalog))
        .route("/dashboards", post(handlers::create_dashboard))
        .route("/dashboards/:id", axum::routing::delete(handlers::delete_dashboard))
        .route("/dashboards/:id/open", post(handlers::open_dashboard))
        .route("/dashboard", axum::routing::patch(handlers::rename_dashboard))
        .route("/dashboard/save", post(handlers::save_dashboard))
        .route("/dashboard/discard", post(handlers::discard_dashboard))
        .route("/dashboard/refresh", post(handlers::refresh_dashboard))
        .route("/tiles", post(handlers::add_tile))
        .route(
            "/tiles/:id",
            put(handlers::update_tile).delete(handlers::remove_tile),
        )
        .route("/tiles/:id/duplicate", post(handlers::duplicate_tile))
        .route("/tiles/:id/move", post(handlers::move_tile))
        .route("/tiles/:id/size", put(handlers::resize_tile))
        .route("/tiles/:id/data", get(handlers::tile_data))
        .route("/layout", put(handlers::apply_layout))
        .route("/breakpoint", put(handlers::set_breakpoint))
        .route("/selection", put(handlers::select_tile))
        .route("/edit-mode", put(handlers::set_edit_mode))
        .route("/draft/status", get(handlers::draft_status))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.bind))?;
    tracing::info!("Starting dashboard-studio on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
