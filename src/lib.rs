//! HTTP gateway with per-client admission control.
//!
//! Every request passes through [`rate_limit::admission_middleware`] before
//! any handler runs. Clients over their limit get a styled HTML 429 page;
//! all other errors use the JSON error body from [`error::ApiError`].

use std::sync::Arc;

use axum::{Router, middleware, routing::get};
use tower_http::trace::TraceLayer;

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod state;
pub mod templates;

pub use state::AppState;

use handlers::{health_handler, metrics_handler, not_found_handler, status_handler, version_handler};
use rate_limit::admission_middleware;

/// Builds the router with admission control layered over every route,
/// including the not-found fallback.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/version", get(version_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(not_found_handler)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admission_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
