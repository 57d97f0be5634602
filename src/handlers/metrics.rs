use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;

use crate::error::ApiError;
use crate::metrics::STORE_ENTRIES;
use crate::state::AppState;

pub async fn metrics_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    // refresh the gauge so a scrape sees the current store size
    STORE_ENTRIES.set(state.admission.tracked_clients() as i64);

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::Internal(format!("metrics encoding failed: {e}")))?;

    Ok(([(CONTENT_TYPE, encoder.format_type().to_string())], buffer))
}
