//! Dual-window admission checking.
//!
//! A request is counted by two independent structures in the shared store: a
//! fixed-window counter and a sliding log. Each is updated in its own atomic
//! batch. The two batches are separate round-trips, so a concurrent request on
//! the same fingerprint can land between them and the two counts can drift
//! apart slightly under load. Admission is then marginally more permissive than
//! nominal; no lock is held across the batches.

pub mod fixed_window;
pub mod sliding_window;

use std::sync::Arc;
use tracing::debug;

use crate::error::{GatekeeperError, Result};
use crate::key_generator::sliding_log_key;
use crate::rate_limit_config::RateLimitPolicy;
use crate::store::{CounterStore, Reply};

pub use fixed_window::FixedWindowCount;
pub use sliding_window::SlidingLogOutcome;

/// Combined bookkeeping from both counting structures for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionCheck {
    pub not_allowed_by_sliding_window: bool,
    pub fixed_window_count: u64,
    pub fixed_window_ttl_remaining_ms: u64,
}

#[derive(Clone)]
pub struct DualWindowChecker {
    store: Arc<dyn CounterStore>,
}

impl DualWindowChecker {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    pub async fn check(
        &self,
        key: &str,
        ttl_ms: u64,
        policy: &RateLimitPolicy,
        now_ms: u64,
    ) -> Result<AdmissionCheck> {
        let fixed = fixed_window::increment(self.store.as_ref(), key, ttl_ms).await?;

        let log_key = sliding_log_key(key);
        let sliding =
            sliding_window::record(self.store.as_ref(), &log_key, &policy.sliding_window, now_ms)
                .await?;

        debug!(
            key = %key,
            count = fixed.count,
            ttl_remaining_ms = fixed.ttl_remaining_ms,
            log_count = sliding.prior_count,
            "Admission check"
        );

        Ok(AdmissionCheck {
            not_allowed_by_sliding_window: sliding.not_allowed,
            fixed_window_count: fixed.count,
            fixed_window_ttl_remaining_ms: fixed.ttl_remaining_ms,
        })
    }
}

/// Rejects an absent batch, a wrong element count, or any element carrying an error.
fn expect_batch(replies: Option<Vec<Reply>>, expected: usize, batch: &str) -> Result<Vec<Reply>> {
    let replies = replies.ok_or_else(|| {
        GatekeeperError::StoreProtocol(format!("{} transaction returned no result", batch))
    })?;

    if replies.len() != expected {
        return Err(GatekeeperError::StoreProtocol(format!(
            "{} transaction returned {} results, expected {}",
            batch,
            replies.len(),
            expected
        )));
    }

    if let Some(Reply::Error(message)) = replies.iter().find(|r| matches!(r, Reply::Error(_))) {
        return Err(GatekeeperError::StoreProtocol(format!(
            "{} transaction failed: {}",
            batch, message
        )));
    }

    Ok(replies)
}

fn expect_integer(reply: &Reply, command: &str) -> Result<i64> {
    match reply {
        Reply::Integer(n) => Ok(*n),
        other => Err(GatekeeperError::StoreProtocol(format!(
            "{} returned {:?}, expected an integer",
            command, other
        ))),
    }
}
