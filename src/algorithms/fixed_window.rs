//! Fixed-window counter.
//!
//! The window is anchored to the first request that creates the key, not to
//! wall-clock boundaries. A burst straddling the moment one window expires and
//! the next is created can briefly reach about twice the nominal rate.

use super::{expect_batch, expect_integer};
use crate::error::{GatekeeperError, Result};
use crate::store::CounterStore;

/// `PTTL` reply for a key that exists without an expiry.
const NO_EXPIRY: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindowCount {
    pub count: u64,
    pub ttl_remaining_ms: u64,
}

/// Increments the counter and reads its TTL in one transaction. When the
/// increment created the key, the expiry is set to `ttl_ms` and the full window
/// is reported.
pub async fn increment(store: &dyn CounterStore, key: &str, ttl_ms: u64) -> Result<FixedWindowCount> {
    let replies = expect_batch(store.incr_with_ttl(key).await?, 2, "fixed-window")?;

    let count = expect_integer(&replies[0], "INCR")?;
    let count = u64::try_from(count).map_err(|_| {
        GatekeeperError::StoreProtocol(format!("INCR returned negative count {}", count))
    })?;

    let ttl = expect_integer(&replies[1], "PTTL")?;
    let ttl_remaining_ms = match ttl {
        NO_EXPIRY => {
            store.expire_ms(key, ttl_ms).await?;
            ttl_ms
        }
        ttl if ttl >= 0 => ttl as u64,
        ttl => {
            return Err(GatekeeperError::StoreProtocol(format!(
                "PTTL returned {} for a key that was just incremented",
                ttl
            )))
        }
    };

    Ok(FixedWindowCount {
        count,
        ttl_remaining_ms,
    })
}
