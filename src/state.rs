use std::sync::Arc;
use std::time::Instant;

use crate::clock::Clock;
use crate::config::Args;
use crate::error::ConfigError;
use crate::rate_limit::{Admission, AdmissionPolicy};

// app's shared state
pub struct AppState {
    pub admission: Admission,
    pub trust_proxy: bool, // read client address from X-Forwarded-For
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        policy: AdmissionPolicy,
        trust_proxy: bool,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>, ConfigError> {
        Ok(Arc::new(Self {
            admission: Admission::new(policy, clock)?,
            trust_proxy,
            started_at: Instant::now(),
        }))
    }

    pub fn from_args(args: &Args, clock: Arc<dyn Clock>) -> Result<Arc<Self>, ConfigError> {
        Self::new(args.admission_policy(), args.trust_proxy, clock)
    }
}
