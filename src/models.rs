use serde::Serialize;

// Health endpoint response
#[derive(Serialize, Clone, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub uptime_seconds: u64,
}

// Status endpoint response
#[derive(Serialize, Clone, Debug)]
pub struct StatusResponse {
    pub status: String,
    pub tracked_clients: usize,
}

// Version endpoint response
#[derive(Serialize, Clone, Debug)]
pub struct VersionResponse {
    pub api: String,
    pub version: VersionInfo,
}

#[derive(Serialize, Clone, Debug)]
pub struct VersionInfo {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}
