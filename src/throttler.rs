use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::algorithms::DualWindowChecker;
use crate::clock::{epoch_millis, Clock};
use crate::error::Result;
use crate::key_generator::Fingerprint;
use crate::policy;
use crate::rate_limit_config::RateLimitConfig;
use crate::store::CounterStore;

/// Admission verdict and the informational numbers sent back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EvaluationResult {
    pub rejected: bool,
    pub retry_after_seconds: u64,
    pub effective_limit: u64,
    pub remaining: u64,
    pub reset_epoch_seconds: u64,
    /// Set when a promotional override supplied the policy.
    pub override_matched: bool,
}

/// Per-request entry point: resolves the policy, runs both window checks and
/// turns them into an accept/reject decision. Holds no mutable state; all
/// counting lives in the shared store.
pub struct Throttler {
    config: Arc<RateLimitConfig>,
    checker: DualWindowChecker,
    clock: Arc<dyn Clock>,
}

impl Throttler {
    pub fn new(config: Arc<RateLimitConfig>, store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            checker: DualWindowChecker::new(store),
            clock,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Store errors are returned as-is; the caller decides whether to fail open or closed.
    pub async fn evaluate(
        &self,
        client_ip: Option<&str>,
        path: Option<&str>,
        auth_header_present: bool,
    ) -> Result<EvaluationResult> {
        let fingerprint = Fingerprint::new(client_ip, path, auth_header_present)?;
        let now = self.clock.now();
        let now_ms = epoch_millis(&now);

        let resolved = policy::resolve(fingerprint.path, auth_header_present, now, &self.config);
        let limit = resolved.policy.limit;
        let key = fingerprint.key();

        debug!(key = %key, limit, is_override = resolved.is_override, "Evaluating request");

        let check = self
            .checker
            .check(&key, self.config.ttl_ms(), resolved.policy, now_ms)
            .await?;

        let ttl_ms = check.fixed_window_ttl_remaining_ms;
        let result = EvaluationResult {
            rejected: check.not_allowed_by_sliding_window || check.fixed_window_count > limit,
            retry_after_seconds: ttl_ms.div_ceil(1000),
            effective_limit: limit,
            remaining: limit.saturating_sub(check.fixed_window_count),
            reset_epoch_seconds: now_ms.saturating_add(ttl_ms).div_ceil(1000),
            override_matched: resolved.is_override,
        };

        if result.rejected {
            warn!(
                key = %key,
                count = check.fixed_window_count,
                sliding_window = check.not_allowed_by_sliding_window,
                retry_after = result.retry_after_seconds,
                "Rate limit exceeded"
            );
        } else {
            debug!(key = %key, remaining = result.remaining, "Request admitted");
        }

        Ok(result)
    }
}
