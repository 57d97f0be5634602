use clap::Parser;
use std::collections::HashSet;
use std::time::Duration;

use crate::cache::StoreOptions;
use crate::error::ConfigError;
use crate::rate_limit::{AdmissionPolicy, RouteOverride};

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "admission-gateway", version)]
#[command(about = "HTTP gateway with per-client admission control")]
pub struct Args {
    // Address to bind
    #[arg(long, default_value = "0.0.0.0", env = "GATEWAY_HOST")]
    pub host: String,

    // Port to run the server on
    #[arg(short, long, default_value_t = 4000, env = "GATEWAY_PORT")]
    pub port: u16,

    // Max requests per client per window
    #[arg(long, default_value_t = 50, env = "GATEWAY_RATE_LIMIT")]
    pub rate_limit: u64,

    // Counting window, e.g. "1m" or "90s"
    #[arg(long, default_value = "1m", value_parser = humantime::parse_duration, env = "GATEWAY_RATE_WINDOW")]
    pub rate_window: Duration,

    // Client identities exempt from limiting (comma-separated)
    #[arg(long, default_value = "127.0.0.1", value_delimiter = ',', env = "GATEWAY_ALLOW_LIST")]
    pub allow_list: Vec<String>,

    // Per-route limit, PATH=MAX or PATH=MAX/WINDOW (repeatable)
    #[arg(long = "route-limit", value_parser = parse_route)]
    pub route_limits: Vec<RouteOverride>,

    // Counter store bounds
    #[arg(long, default_value_t = 100_000, env = "GATEWAY_CACHE_MAX_ENTRIES")]
    pub cache_max_entries: usize,

    #[arg(long, default_value_t = 50_000_000, env = "GATEWAY_CACHE_MAX_SIZE")]
    pub cache_max_size: usize,

    #[arg(long, default_value = "5m", value_parser = humantime::parse_duration, env = "GATEWAY_CACHE_TTL")]
    pub cache_ttl: Duration,

    // Take the client address from X-Forwarded-For
    #[arg(long, env = "GATEWAY_TRUST_PROXY")]
    pub trust_proxy: bool,

    #[arg(long, default_value = "info", env = "GATEWAY_LOG_LEVEL")]
    pub log_level: String,

    // "text" or "json"
    #[arg(long, default_value = "text", env = "GATEWAY_LOG_FORMAT")]
    pub log_format: String,
}

fn parse_route(s: &str) -> Result<RouteOverride, ConfigError> {
    s.parse()
}

impl Args {
    pub fn admission_policy(&self) -> AdmissionPolicy {
        AdmissionPolicy {
            window: Some(self.rate_window),
            max_requests: self.rate_limit,
            allow_list: self
                .allow_list
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect::<HashSet<_>>(),
            store: StoreOptions {
                max_entries: self.cache_max_entries,
                max_total_size: self.cache_max_size,
                ttl: self.cache_ttl,
            },
            routes: self.route_limits.clone(),
        }
    }
}
