mod health;
mod metrics;
mod status;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use status::{not_found_handler, status_handler, version_handler};
