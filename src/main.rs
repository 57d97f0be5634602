use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use admission_gateway::clock::SystemClock;
use admission_gateway::config::Args;
use admission_gateway::metrics::STORE_ENTRIES;
use admission_gateway::{AppState, router};

// how often expired counter records are swept
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    // parse cli arguments
    let args = Args::parse();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    if args.log_format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    // refuse to start without a working rate limiter
    let state = match AppState::from_args(&args, Arc::new(SystemClock)) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("invalid admission configuration: {e}");
            std::process::exit(1);
        }
    };

    let purge_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let removed = purge_state.admission.purge_expired();
            if removed > 0 {
                tracing::debug!(removed, "purged expired counter records");
            }
            STORE_ENTRIES.set(purge_state.admission.tracked_clients() as i64);
        }
    });

    let app = router(state);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, "failed to bind: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(%addr, "gateway listening");
    tracing::info!(
        limit = args.rate_limit,
        window = %humantime::format_duration(args.rate_window),
        allow_listed = args.allow_list.len(),
        route_overrides = args.route_limits.len(),
        "admission control active (limits are per instance)"
    );

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        tracing::error!("server error: {e}");
    }

    tracing::info!("gateway shut down");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install signal handler: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
