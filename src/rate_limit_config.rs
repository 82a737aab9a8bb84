use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::{Validate, ValidationError};

use crate::error::{GatekeeperError, Result};

/// Burst quota enforced by the sliding log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SlidingWindow {
    #[serde(with = "humantime_serde")]
    #[validate(custom(function = "whole_milliseconds"))]
    pub window_size: Duration,
    #[validate(range(min = 1))]
    pub max_requests: u64,
}

/// Coarse quota over the configured TTL plus the fine-grained burst quota.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RateLimitPolicy {
    #[validate(range(min = 1))]
    pub limit: u64,
    #[validate(nested)]
    pub sliding_window: SlidingWindow,
}

/// Time-bounded policy that supersedes the auth tier for one exact path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "ordered_bounds"))]
pub struct OverrideEvent {
    pub url: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[validate(nested)]
    pub policy: RateLimitPolicy,
}

impl OverrideEvent {
    /// Exact path match, both bounds inclusive.
    pub fn is_active(&self, path: &str, now: DateTime<Utc>) -> bool {
        self.url == path && self.start_time <= now && now <= self.end_time
    }
}

/// Rate limit configuration as it arrives from a file, before validation.
/// Every field is optional so that a missing section is reported instead of defaulted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRateLimitConfig {
    #[serde(default, with = "humantime_serde")]
    pub ttl: Option<Duration>,
    pub authenticated: Option<RateLimitPolicy>,
    pub unauthenticated: Option<RateLimitPolicy>,
    pub overrides: Option<Vec<OverrideEvent>>,
}

/// Validated, immutable rate limit configuration shared by every evaluation.
#[derive(Debug, Clone, Validate)]
pub struct RateLimitConfig {
    #[validate(custom(function = "whole_milliseconds"))]
    ttl: Duration,
    #[validate(nested)]
    authenticated: RateLimitPolicy,
    #[validate(nested)]
    unauthenticated: RateLimitPolicy,
    #[validate(nested)]
    overrides: Vec<OverrideEvent>,
}

impl RateLimitConfig {
    pub fn new(
        ttl: Duration,
        authenticated: RateLimitPolicy,
        unauthenticated: RateLimitPolicy,
        overrides: Vec<OverrideEvent>,
    ) -> Result<Self> {
        let config = Self {
            ttl,
            authenticated,
            unauthenticated,
            overrides,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawRateLimitConfig = serde_json::from_str(json)
            .map_err(|e| GatekeeperError::ConfigValidation(format!("malformed policy file: {}", e)))?;
        Self::try_from(raw)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn ttl_ms(&self) -> u64 {
        saturating_millis(self.ttl)
    }

    pub fn authenticated(&self) -> &RateLimitPolicy {
        &self.authenticated
    }

    pub fn unauthenticated(&self) -> &RateLimitPolicy {
        &self.unauthenticated
    }

    pub fn overrides(&self) -> &[OverrideEvent] {
        &self.overrides
    }
}

impl TryFrom<RawRateLimitConfig> for RateLimitConfig {
    type Error = GatekeeperError;

    fn try_from(raw: RawRateLimitConfig) -> Result<Self> {
        let ttl = raw.ttl.ok_or_else(|| {
            GatekeeperError::ConfigValidation("TTL must be a positive number".to_string())
        })?;
        let authenticated = raw.authenticated.ok_or_else(|| {
            GatekeeperError::ConfigValidation("authenticated config missing".to_string())
        })?;
        let unauthenticated = raw.unauthenticated.ok_or_else(|| {
            GatekeeperError::ConfigValidation("unauthenticated config missing".to_string())
        })?;
        let overrides = raw.overrides.ok_or_else(|| {
            GatekeeperError::ConfigValidation("override config missing".to_string())
        })?;

        Self::new(ttl, authenticated, unauthenticated, overrides)
    }
}

impl Default for RateLimitConfig {
    /// One hour window: 100 unauthenticated / 200 authenticated requests,
    /// with bursts capped at 10 / 20 per minute. No promotional overrides.
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60 * 60),
            authenticated: RateLimitPolicy::new(200, Duration::from_secs(60), 20),
            unauthenticated: RateLimitPolicy::new(100, Duration::from_secs(60), 10),
            overrides: Vec::new(),
        }
    }
}

impl RateLimitPolicy {
    pub fn new(limit: u64, window_size: Duration, max_requests: u64) -> Self {
        Self {
            limit,
            sliding_window: SlidingWindow {
                window_size,
                max_requests,
            },
        }
    }
}

impl SlidingWindow {
    pub fn window_size_ms(&self) -> u64 {
        saturating_millis(self.window_size)
    }
}

/// Longest TTL or sliding window accepted in a policy file.
pub const MAX_WINDOW: Duration = Duration::from_secs(366 * 24 * 60 * 60);

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn whole_milliseconds(duration: &Duration) -> std::result::Result<(), ValidationError> {
    if duration.as_millis() == 0 {
        return Err(ValidationError::new("duration_must_be_at_least_one_millisecond"));
    }
    if *duration > MAX_WINDOW {
        return Err(ValidationError::new("duration_exceeds_one_year"));
    }
    Ok(())
}

fn ordered_bounds(event: &OverrideEvent) -> std::result::Result<(), ValidationError> {
    if event.start_time > event.end_time {
        return Err(ValidationError::new("override_start_after_end"));
    }
    Ok(())
}
