//! Fingerprint and store key construction.

use crate::error::{GatekeeperError, Result};

/// Namespace shared by every key this service writes.
pub const KEY_PREFIX: &str = "limit";

/// Appended to the fixed-window key to name the sliding log.
pub const SLIDING_LOG_SUFFIX: &str = "-slide";

/// One rate limit bucket: a (client, route, auth-state) triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint<'a> {
    pub client_ip: &'a str,
    pub path: &'a str,
    pub authenticated: bool,
}

impl<'a> Fingerprint<'a> {
    /// Absent or empty client IP or path cannot identify a bucket.
    pub fn new(client_ip: Option<&'a str>, path: Option<&'a str>, authenticated: bool) -> Result<Self> {
        let client_ip = client_ip.filter(|ip| !ip.is_empty()).ok_or_else(|| {
            GatekeeperError::InvalidRequest("IP or endpoint is missing".to_string())
        })?;
        let path = path.filter(|path| !path.is_empty()).ok_or_else(|| {
            GatekeeperError::InvalidRequest("IP or endpoint is missing".to_string())
        })?;

        Ok(Self {
            client_ip,
            path,
            authenticated,
        })
    }

    /// Fixed-window counter key: `limit:{ip}:{path}:{auth}`.
    pub fn key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            KEY_PREFIX, self.client_ip, self.path, self.authenticated
        )
    }
}

/// Sliding log key for a fixed-window key.
pub fn sliding_log_key(key: &str) -> String {
    format!("{}{}", key, SLIDING_LOG_SUFFIX)
}
