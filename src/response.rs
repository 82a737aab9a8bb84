use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// Body sent with a 429.
#[derive(Debug, Serialize)]
pub struct TooManyRequestsResponse {
    pub error: &'static str,
    #[serde(rename = "retryAfter")]
    pub retry_after: u64,
}

impl TooManyRequestsResponse {
    pub fn new(retry_after: u64) -> Self {
        Self {
            error: "Too Many Requests",
            retry_after,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub store_connected: bool,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self::with_status("healthy", true)
    }

    pub fn unhealthy() -> Self {
        Self::with_status("unhealthy", false)
    }

    fn with_status(status: &str, store_connected: bool) -> Self {
        Self {
            status: status.to_string(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            store_connected,
        }
    }
}
