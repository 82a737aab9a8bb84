//! Shared counter store abstraction.
//!
//! The admission checker only needs two atomic batches and a single expiry
//! command. `RedisStore` runs them as `MULTI/EXEC` transactions; `MemoryStore`
//! mirrors the same command semantics inside one process.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::clock::{epoch_millis, Clock};
use crate::error::Result;

/// One element of an atomic batch result.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Integer(i64),
    Status(String),
    Nil,
    /// The command failed inside the transaction.
    Error(String),
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// `MULTI; INCR key; PTTL key; EXEC`.
    /// `None` when the transaction produced no result.
    async fn incr_with_ttl(&self, key: &str) -> Result<Option<Vec<Reply>>>;

    /// `PEXPIRE key ttl_ms`.
    async fn expire_ms(&self, key: &str, ttl_ms: u64) -> Result<()>;

    /// `MULTI; ZREMRANGEBYSCORE key -inf window_start; ZCARD key;
    /// ZADD key now member; PEXPIRE key window_ms; EXEC`.
    async fn record_in_log(
        &self,
        key: &str,
        window_start_ms: u64,
        now_ms: u64,
        member: &str,
        window_ms: u64,
    ) -> Result<Option<Vec<Reply>>>;

    async fn ping(&self) -> Result<String>;
}

#[derive(Debug)]
enum Value {
    Counter(i64),
    Log(Vec<(u64, String)>),
}

#[derive(Debug)]
struct Slot {
    value: Value,
    expires_at_ms: Option<u64>,
}

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

/// Minimum clock time between two full sweeps of expired slots.
const SWEEP_INTERVAL_MS: u64 = 1_000;

/// In-process store. Counts are not shared between processes.
///
/// Expired keys are dropped lazily when touched, and every batch also sweeps
/// the whole map at most once per `SWEEP_INTERVAL_MS`, so keys that are never
/// seen again do not accumulate.
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<String, Slot>>,
    last_sweep_ms: AtomicU64,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            slots: Mutex::new(HashMap::new()),
            last_sweep_ms: AtomicU64::new(0),
        }
    }

    /// Removes every expired slot.
    pub async fn cleanup_expired(&self) {
        let now = self.now_ms();
        let mut slots = self.slots.lock().await;
        sweep_expired(&mut slots, now);
        self.last_sweep_ms.store(now, Ordering::Relaxed);
    }

    /// Called with the map lock held.
    fn sweep_if_due(&self, slots: &mut HashMap<String, Slot>, now_ms: u64) {
        let last = self.last_sweep_ms.load(Ordering::Relaxed);
        if now_ms.saturating_sub(last) >= SWEEP_INTERVAL_MS {
            sweep_expired(slots, now_ms);
            self.last_sweep_ms.store(now_ms, Ordering::Relaxed);
        }
    }

    fn now_ms(&self) -> u64 {
        epoch_millis(&self.clock.now())
    }

    /// Number of live keys, counting only those not yet expired.
    pub async fn len(&self) -> usize {
        let now = self.now_ms();
        let slots = self.slots.lock().await;
        slots.values().filter(|slot| !is_expired(slot, now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn is_expired(slot: &Slot, now_ms: u64) -> bool {
    matches!(slot.expires_at_ms, Some(at) if at <= now_ms)
}

fn sweep_expired(slots: &mut HashMap<String, Slot>, now_ms: u64) {
    slots.retain(|_, slot| !is_expired(slot, now_ms));
}

fn purge_expired(slots: &mut HashMap<String, Slot>, key: &str, now_ms: u64) {
    if slots.get(key).is_some_and(|slot| is_expired(slot, now_ms)) {
        slots.remove(key);
    }
}

fn pttl(slots: &HashMap<String, Slot>, key: &str, now_ms: u64) -> Reply {
    match slots.get(key) {
        None => Reply::Integer(-2),
        Some(Slot { expires_at_ms: None, .. }) => Reply::Integer(-1),
        Some(Slot { expires_at_ms: Some(at), .. }) => {
            Reply::Integer(i64::try_from(at.saturating_sub(now_ms)).unwrap_or(i64::MAX))
        }
    }
}

fn pexpire(slots: &mut HashMap<String, Slot>, key: &str, now_ms: u64, ttl_ms: u64) -> Reply {
    match slots.get_mut(key) {
        Some(slot) => {
            slot.expires_at_ms = Some(now_ms.saturating_add(ttl_ms));
            Reply::Integer(1)
        }
        None => Reply::Integer(0),
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn incr_with_ttl(&self, key: &str) -> Result<Option<Vec<Reply>>> {
        let now = self.now_ms();
        let mut slots = self.slots.lock().await;
        self.sweep_if_due(&mut slots, now);
        purge_expired(&mut slots, key, now);

        let slot = slots.entry(key.to_string()).or_insert(Slot {
            value: Value::Counter(0),
            expires_at_ms: None,
        });
        let incr = match &mut slot.value {
            Value::Counter(count) => {
                *count += 1;
                Reply::Integer(*count)
            }
            Value::Log(_) => Reply::Error(WRONG_TYPE.to_string()),
        };

        Ok(Some(vec![incr, pttl(&slots, key, now)]))
    }

    async fn expire_ms(&self, key: &str, ttl_ms: u64) -> Result<()> {
        let now = self.now_ms();
        let mut slots = self.slots.lock().await;
        self.sweep_if_due(&mut slots, now);
        purge_expired(&mut slots, key, now);
        pexpire(&mut slots, key, now, ttl_ms);
        Ok(())
    }

    async fn record_in_log(
        &self,
        key: &str,
        window_start_ms: u64,
        now_ms: u64,
        member: &str,
        window_ms: u64,
    ) -> Result<Option<Vec<Reply>>> {
        let now = self.now_ms();
        let mut slots = self.slots.lock().await;
        self.sweep_if_due(&mut slots, now);
        purge_expired(&mut slots, key, now);

        let slot = slots.entry(key.to_string()).or_insert(Slot {
            value: Value::Log(Vec::new()),
            expires_at_ms: None,
        });
        let (removed, card, added) = match &mut slot.value {
            Value::Log(entries) => {
                let before = entries.len();
                entries.retain(|(score, _)| *score > window_start_ms);
                let removed = Reply::Integer((before - entries.len()) as i64);
                let card = Reply::Integer(entries.len() as i64);

                let added = match entries.iter_mut().find(|(_, m)| m == member) {
                    Some(entry) => {
                        entry.0 = now_ms;
                        Reply::Integer(0)
                    }
                    None => {
                        entries.push((now_ms, member.to_string()));
                        Reply::Integer(1)
                    }
                };
                entries.sort_by_key(|(score, _)| *score);
                (removed, card, added)
            }
            Value::Counter(_) => (
                Reply::Error(WRONG_TYPE.to_string()),
                Reply::Error(WRONG_TYPE.to_string()),
                Reply::Error(WRONG_TYPE.to_string()),
            ),
        };
        let expire = pexpire(&mut slots, key, now, window_ms);

        Ok(Some(vec![removed, card, added, expire]))
    }

    async fn ping(&self) -> Result<String> {
        Ok("PONG".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{DateTime, Duration};

    fn store() -> (MemoryStore, ManualClock) {
        let clock = ManualClock::new(DateTime::from_timestamp_millis(1_700_000_000_000).unwrap());
        (MemoryStore::new(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_incr_reports_no_expiry_until_set() {
        let (store, _clock) = store();

        let replies = store.incr_with_ttl("limit:a").await.unwrap().unwrap();
        assert_eq!(replies, vec![Reply::Integer(1), Reply::Integer(-1)]);

        store.expire_ms("limit:a", 5_000).await.unwrap();
        let replies = store.incr_with_ttl("limit:a").await.unwrap().unwrap();
        assert_eq!(replies, vec![Reply::Integer(2), Reply::Integer(5_000)]);
    }

    #[tokio::test]
    async fn test_counter_expires() {
        let (store, clock) = store();

        store.incr_with_ttl("limit:a").await.unwrap();
        store.expire_ms("limit:a", 1_000).await.unwrap();
        clock.advance(Duration::milliseconds(1_000));

        assert!(store.is_empty().await);
        let replies = store.incr_with_ttl("limit:a").await.unwrap().unwrap();
        assert_eq!(replies[0], Reply::Integer(1));
    }

    #[tokio::test]
    async fn test_log_prunes_counts_then_adds() {
        let (store, _clock) = store();

        for (i, now) in [100u64, 200, 300].into_iter().enumerate() {
            let replies = store
                .record_in_log("log", 0, now, &format!("m{}", i), 1_000)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(replies[1], Reply::Integer(i as i64));
        }

        let replies = store.record_in_log("log", 200, 400, "m3", 1_000).await.unwrap().unwrap();
        assert_eq!(
            replies,
            vec![Reply::Integer(2), Reply::Integer(1), Reply::Integer(1), Reply::Integer(1)]
        );
    }

    #[tokio::test]
    async fn test_wrong_type_is_reported_per_command() {
        let (store, _clock) = store();

        store.incr_with_ttl("shared").await.unwrap();
        let replies = store.record_in_log("shared", 0, 1, "m", 1_000).await.unwrap().unwrap();
        assert!(matches!(replies[1], Reply::Error(_)));
    }

    #[tokio::test]
    async fn test_expired_keys_from_other_clients_are_swept() {
        let (store, clock) = store();

        for i in 0..10_000 {
            let key = format!("limit:10.0.{}.{}:/:false", i / 256, i % 256);
            store.incr_with_ttl(&key).await.unwrap();
            store.expire_ms(&key, 1_000).await.unwrap();
            store
                .record_in_log(&format!("{}-slide", key), 0, 1, "m", 1_000)
                .await
                .unwrap();
        }
        assert_eq!(store.slots.lock().await.len(), 20_000);

        clock.advance(Duration::hours(24));
        store.incr_with_ttl("limit:192.0.2.1:/:false").await.unwrap();

        assert_eq!(store.slots.lock().await.len(), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_cleanup_expired_keeps_live_keys() {
        let (store, clock) = store();

        store.incr_with_ttl("short").await.unwrap();
        store.expire_ms("short", 1_000).await.unwrap();
        store.incr_with_ttl("long").await.unwrap();
        store.expire_ms("long", 60_000).await.unwrap();
        store.incr_with_ttl("persistent").await.unwrap();

        clock.advance(Duration::seconds(2));
        store.cleanup_expired().await;

        let slots = store.slots.lock().await;
        assert!(!slots.contains_key("short"));
        assert!(slots.contains_key("long"));
        assert!(slots.contains_key("persistent"));
    }

    #[tokio::test]
    async fn test_huge_expiry_saturates() {
        let (store, _clock) = store();

        store.incr_with_ttl("limit:a").await.unwrap();
        store.expire_ms("limit:a", u64::MAX).await.unwrap();

        let replies = store.incr_with_ttl("limit:a").await.unwrap().unwrap();
        assert_eq!(replies[0], Reply::Integer(2));
        assert!(matches!(replies[1], Reply::Integer(ttl) if ttl > 0));
    }
}
