use axum::{Json, extract::State, http::Uri};
use axum::http::header::CACHE_CONTROL;
use axum::response::IntoResponse;
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::{StatusResponse, VersionInfo, VersionResponse};
use crate::state::AppState;

pub const API_NAME: &str = "v1";

pub async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let tracked_clients = state.admission.tracked_clients();

    (
        [(CACHE_CONTROL, "no-store")],
        Json(StatusResponse {
            status: "ok".to_string(),
            tracked_clients,
        }),
    )
}

pub async fn version_handler() -> impl IntoResponse {
    (
        [(CACHE_CONTROL, "no-store")],
        Json(VersionResponse {
            api: API_NAME.to_string(),
            version: VersionInfo {
                major: env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or_default(),
                minor: env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or_default(),
                patch: env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or_default(),
            },
        }),
    )
}

// Unmatched routes go through the generic JSON error path
pub async fn not_found_handler(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("no route for {}", uri.path()))
}
