//! HTTP API server for the allocation service.
//!
//! Every write endpoint becomes one command handled by the message bus.
//! Reads go straight to the allocations view. Structured logging comes
//! from `tracing` and metrics are exported for Prometheus.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use projections::InMemoryAllocationsView;
use service_layer::{Dependencies, bootstrap};
use store::InMemoryStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::allocations::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/add_batch", post(routes::allocations::add_batch))
        .route("/allocate", post(routes::allocations::allocate))
        .route(
            "/change_batch_quantity",
            post(routes::allocations::change_batch_quantity),
        )
        .route(
            "/allocations/{orderid}",
            get(routes::allocations::allocations_for),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds the message bus from `deps` and wraps it in application state.
pub fn create_state(deps: Dependencies) -> Arc<AppState> {
    let read_model = deps.read_model.clone();
    Arc::new(AppState {
        bus: Arc::new(bootstrap(deps)),
        read_model,
    })
}

/// Creates application state over an in-memory store and view.
///
/// The store is returned so callers can inspect committed products.
pub fn create_default_state() -> (Arc<AppState>, InMemoryStore) {
    let store = InMemoryStore::new();
    let deps = Dependencies::new(
        Arc::new(store.clone()),
        Arc::new(InMemoryAllocationsView::new()),
    );
    (create_state(deps), store)
}
