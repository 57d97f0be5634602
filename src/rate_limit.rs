//! Per-client admission control with fixed-window counters.
//!
//! Every request is counted against its client identity. Allow-listed
//! identities skip counting entirely; everyone else is rejected with 429 once
//! their count in the current window goes past the threshold. Routes can carry
//! their own threshold and window through a child counter store.
//!
//! Counters live in this process only. Behind N independent instances the
//! effective limit is `max_requests * N`.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use crate::cache::{CounterRecord, CounterStore, StoreOptions, StoreOverrides};
use crate::clock::Clock;
use crate::error::{ApiError, ConfigError};
use crate::metrics::{ALLOW_LISTED_TOTAL, REJECTED_TOTAL, REQUESTS_TOTAL};
use crate::state::AppState;

pub static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub static X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

// Identity used when a request carries no usable address
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Threshold and window for one exact request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOverride {
    pub path: String,
    pub max_requests: Option<u64>,
    pub window: Option<Duration>,
}

impl FromStr for RouteOverride {
    type Err = ConfigError;

    /// Parses `PATH=MAX` or `PATH=MAX/WINDOW`, e.g. `/login=5/30s`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidRoute(s.to_string());

        let (path, limit) = s.split_once('=').ok_or_else(invalid)?;
        let path = path.trim();
        if !path.starts_with('/') {
            return Err(invalid());
        }

        let (max, window) = match limit.split_once('/') {
            Some((max, window)) => (max, Some(window)),
            None => (limit, None),
        };

        let max_requests = max.trim().parse::<u64>().map_err(|_| invalid())?;
        let window = window
            .map(|w| humantime::parse_duration(w.trim()).map_err(|_| invalid()))
            .transpose()?;

        Ok(Self {
            path: path.to_string(),
            max_requests: Some(max_requests),
            window,
        })
    }
}

/// Static admission settings, fixed at startup.
#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    pub window: Option<Duration>,
    pub max_requests: u64,
    pub allow_list: HashSet<String>,
    pub store: StoreOptions,
    pub routes: Vec<RouteOverride>,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            window: Some(Duration::from_secs(60)),
            max_requests: 50,
            allow_list: HashSet::from(["127.0.0.1".to_string()]),
            store: StoreOptions::default(),
            routes: Vec::new(),
        }
    }
}

/// Remaining budget for a counted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u64,
    pub remaining: u64,
    pub reset_after: Duration,
}

impl Quota {
    fn new(limit: u64, record: &CounterRecord, reset_after: Duration) -> Self {
        Self {
            limit,
            remaining: limit.saturating_sub(record.count),
            reset_after,
        }
    }

    // Standard rate limit headers, reset rounded up to whole seconds
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(X_RATELIMIT_LIMIT.clone(), HeaderValue::from(self.limit));
        headers.insert(
            X_RATELIMIT_REMAINING.clone(),
            HeaderValue::from(self.remaining),
        );
        headers.insert(
            X_RATELIMIT_RESET.clone(),
            HeaderValue::from(ceil_secs(self.reset_after)),
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    AllowListed,
    Allowed(Quota),
    Rejected { quota: Quota, message: String },
}

// Threshold plus the store that counts against it
struct Scope {
    max_requests: u64,
    store: CounterStore,
}

/// The admission controller: allow-list, global scope and per-route scopes.
pub struct Admission {
    allow_list: HashSet<String>,
    global: Scope,
    routes: HashMap<String, Scope>,
}

impl Admission {
    /// Builds the controller. Refuses to activate on invalid settings rather
    /// than run without limits.
    pub fn new(policy: AdmissionPolicy, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        if policy.max_requests == 0 {
            return Err(ConfigError::ZeroLimit);
        }

        let store = CounterStore::new(policy.store, policy.window, clock)?;

        let mut routes = HashMap::with_capacity(policy.routes.len());
        for route in policy.routes {
            let max_requests = route.max_requests.unwrap_or(policy.max_requests);
            if max_requests == 0 {
                return Err(ConfigError::ZeroLimit);
            }
            let store = store.child(StoreOverrides {
                window: route.window,
            })?;
            routes.insert(
                route.path,
                Scope {
                    max_requests,
                    store,
                },
            );
        }

        Ok(Self {
            allow_list: policy.allow_list,
            global: Scope {
                max_requests: policy.max_requests,
                store,
            },
            routes,
        })
    }

    pub fn is_allow_listed(&self, identity: &str) -> bool {
        self.allow_list.contains(identity)
    }

    /// Counter store applied to `path`.
    pub fn store_for(&self, path: &str) -> &CounterStore {
        &self.scope_for(path).store
    }

    fn scope_for(&self, path: &str) -> &Scope {
        self.routes.get(path).unwrap_or(&self.global)
    }

    /// Counts the request and decides whether it may proceed.
    pub fn check(&self, identity: &str, path: &str) -> Decision {
        if self.is_allow_listed(identity) {
            return Decision::AllowListed;
        }

        let scope = self.scope_for(path);
        let record = scope.store.increment(identity);
        let reset_after = record.resets_in(scope.store.now());
        let quota = Quota::new(scope.max_requests, &record, reset_after);

        if record.count <= scope.max_requests {
            Decision::Allowed(quota)
        } else {
            let message = format!(
                "Rate limit exceeded, retry in {}",
                humantime::format_duration(Duration::from_secs(ceil_secs(reset_after)))
            );
            Decision::Rejected { quota, message }
        }
    }

    /// Drops expired records from every scope; returns how many went.
    pub fn purge_expired(&self) -> usize {
        self.global.store.purge_expired()
            + self
                .routes
                .values()
                .map(|scope| scope.store.purge_expired())
                .sum::<usize>()
    }

    pub fn tracked_clients(&self) -> usize {
        self.global.store.len()
            + self
                .routes
                .values()
                .map(|scope| scope.store.len())
                .sum::<usize>()
    }
}

// Whole seconds, rounded up
pub(crate) fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Extracts the client identity from the request.
fn client_identity(req: &Request, trust_proxy: bool) -> String {
    // X-Forwarded-For first hop, only when running behind a trusted proxy
    if trust_proxy {
        let forwarded = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|xff| xff.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(first) = forwarded {
            return first.to_string();
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| UNKNOWN_CLIENT.to_string(), |ci| ci.0.ip().to_string())
}

/// Admission middleware. Runs ahead of every handler and short-circuits with
/// the 429 page once the client is over its limit.
pub async fn admission_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    REQUESTS_TOTAL.inc();

    let identity = client_identity(&req, state.trust_proxy);
    let path = req.uri().path().to_string();

    match state.admission.check(&identity, &path) {
        Decision::AllowListed => {
            ALLOW_LISTED_TOTAL.inc();
            debug!(client = %identity, "allow-listed client admitted");
            next.run(req).await
        }
        Decision::Allowed(quota) => {
            let mut response = next.run(req).await;
            quota.apply(response.headers_mut());
            response
        }
        Decision::Rejected { quota, message } => {
            REJECTED_TOTAL.inc();
            warn!(client = %identity, %path, limit = quota.limit, "rate limit exceeded");
            let mut response = ApiError::TooManyRequests {
                message,
                limit: quota.limit,
                retry_after: quota.reset_after,
            }
            .into_response();
            quota.apply(response.headers_mut());
            response
        }
    }
}
