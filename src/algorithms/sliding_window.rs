//! Sliding log of request timestamps.
//!
//! The count is taken before the current request is inserted, so with
//! `max_requests = n` the log holds n entries when request n+1 arrives and that
//! request is still admitted. Only a pre-insertion count strictly above
//! `max_requests` rejects.

use uuid::Uuid;

use super::{expect_batch, expect_integer};
use crate::error::{GatekeeperError, Result};
use crate::rate_limit_config::SlidingWindow;
use crate::store::CounterStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlidingLogOutcome {
    /// Entries still inside the window, excluding this request.
    pub prior_count: u64,
    pub not_allowed: bool,
}

/// Prunes entries at or before `now - window`, counts the rest, records this
/// request at `now` and refreshes the log's expiry, all in one transaction.
pub async fn record(
    store: &dyn CounterStore,
    log_key: &str,
    window: &SlidingWindow,
    now_ms: u64,
) -> Result<SlidingLogOutcome> {
    let window_ms = window.window_size_ms();
    let window_start_ms = now_ms.saturating_sub(window_ms);
    // Unique member so requests in the same millisecond are all logged.
    let member = format!("{}-{}", now_ms, Uuid::new_v4());

    let replies = expect_batch(
        store
            .record_in_log(log_key, window_start_ms, now_ms, &member, window_ms)
            .await?,
        4,
        "sliding-log",
    )?;

    let count = expect_integer(&replies[1], "ZCARD")?;
    let prior_count = u64::try_from(count).map_err(|_| {
        GatekeeperError::StoreProtocol(format!("ZCARD returned negative count {}", count))
    })?;

    Ok(SlidingLogOutcome {
        prior_count,
        not_allowed: prior_count > window.max_requests,
    })
}
