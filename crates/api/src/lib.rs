//! HTTP API server with observability for the checkout engine.
//!
//! Exposes `POST /v1/checkout`, a health check and Prometheus metrics, with
//! structured logging (tracing) around every request.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use cache::CacheBackend;
use checkout::{CheckoutEngine, CheckoutSettings};
use metrics_exporter_prometheus::PrometheusHandle;
use store::CheckoutStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::checkout::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, C>(state: Arc<AppState<S, C>>, metrics_handle: PrometheusHandle) -> Router
where
    S: CheckoutStore + 'static,
    C: CacheBackend + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/v1/checkout", post(routes::checkout::create::<S, C>))
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

/// Wraps a store and cache in an engine and the shared handler state.
pub fn create_state<S, C>(store: S, cache: C, settings: CheckoutSettings) -> Arc<AppState<S, C>>
where
    S: CheckoutStore,
    C: CacheBackend + 'static,
{
    Arc::new(AppState {
        engine: CheckoutEngine::new(store, cache, settings),
    })
}
