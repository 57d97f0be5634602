//! Error types: startup configuration errors and per-request API errors.
//!
//! `ApiError` responses go through an ordered responder chain. A responder
//! claims a status code and renders the whole response; anything unclaimed
//! falls through to the generic JSON error body.

use std::time::Duration;

use axum::Json;
use axum::http::header::{CONTENT_TYPE, RETRY_AFTER};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::rate_limit::ceil_secs;
use crate::templates::render_rate_limit_page;

/// Invalid admission settings. Fatal at startup.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("rate limit window is required")]
    MissingWindow,

    #[error("rate limit window must be greater than zero")]
    ZeroWindow,

    #[error("rate limit must allow at least one request per window")]
    ZeroLimit,

    #[error("counter store needs a non-zero {0}")]
    ZeroCapacity(&'static str),

    #[error("invalid route limit '{0}': expected PATH=MAX or PATH=MAX/WINDOW")]
    InvalidRoute(String),
}

/// Request-level failure surfaced to the client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Client went over its admission threshold.
    #[error("{message}")]
    TooManyRequests {
        message: String,
        limit: u64,
        retry_after: Duration,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::TooManyRequests { .. } => "too_many_requests",
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub detail: Option<String>,
}

/// One link of the responder chain.
struct Responder {
    matches: fn(StatusCode) -> bool,
    render: fn(&ApiError) -> Response,
}

const RESPONDERS: &[Responder] = &[Responder {
    matches: is_too_many_requests,
    render: rate_limit_page,
}];

fn is_too_many_requests(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
}

fn rate_limit_page(err: &ApiError) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        [(CONTENT_TYPE, "text/html; charset=utf-8")],
        render_rate_limit_page(&err.to_string()),
    )
        .into_response();

    if let ApiError::TooManyRequests { retry_after, .. } = err {
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(ceil_secs(*retry_after)));
    }
    response
}

fn json_error(err: &ApiError) -> Response {
    let detail = match err {
        ApiError::Internal(msg) => {
            tracing::error!(%msg, "internal server error");
            Some(msg.clone())
        }
        ApiError::NotFound(msg) | ApiError::BadRequest(msg) => Some(msg.clone()),
        ApiError::TooManyRequests { message, .. } => Some(message.clone()),
    };

    let body = ErrorBody {
        error: err.code().to_string(),
        detail,
    };
    (err.status(), Json(body)).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        RESPONDERS
            .iter()
            .find(|responder| (responder.matches)(status))
            .map_or_else(|| json_error(&self), |responder| (responder.render)(&self))
    }
}
