use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Value};
use tracing::{debug, info};

use crate::error::{GatekeeperError, Result};
use crate::store::{CounterStore, Reply};

/// Reconnect backoff: `factor * exponent_base^attempt` milliseconds.
const BACKOFF_EXPONENT_BASE: u64 = 2;
const BACKOFF_FACTOR_MS: u64 = 100;

/// Shared counter store backed by redis. The connection manager reconnects on
/// its own, giving up after `retries` attempts.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str, retries: usize) -> Result<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            GatekeeperError::StoreConnectivity(format!("Failed to create Redis client: {}", e))
        })?;

        let conn = ConnectionManager::new_with_backoff(
            client,
            BACKOFF_EXPONENT_BASE,
            BACKOFF_FACTOR_MS,
            retries,
        )
        .await
        .map_err(|e| {
            GatekeeperError::StoreConnectivity(format!("Failed to connect to Redis: {}", e))
        })?;

        info!(url = %redis_url, retries, "Connected to Redis counter store");
        Ok(Self { conn })
    }
}

/// Unpacks the value of an atomic pipeline: the `EXEC` array, or nil when the
/// transaction was discarded.
fn exec_replies(value: Value) -> Result<Option<Vec<Reply>>> {
    match value {
        Value::Bulk(items) => Ok(Some(items.into_iter().map(to_reply).collect())),
        Value::Nil => Ok(None),
        other => Err(GatekeeperError::StoreProtocol(format!(
            "transaction returned {:?} instead of an array",
            other
        ))),
    }
}

fn to_reply(value: Value) -> Reply {
    match value {
        Value::Int(n) => Reply::Integer(n),
        Value::Nil => Reply::Nil,
        Value::Okay => Reply::Status("OK".to_string()),
        Value::Status(status) => Reply::Status(status),
        Value::Data(bytes) => Reply::Status(String::from_utf8_lossy(&bytes).into_owned()),
        Value::Bulk(_) => Reply::Error("unexpected nested array".to_string()),
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn incr_with_ttl(&self, key: &str) -> Result<Option<Vec<Reply>>> {
        let mut conn = self.conn.clone();

        let value = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(key)
            .cmd("PTTL")
            .arg(key)
            .query_async::<_, Value>(&mut conn)
            .await?;

        exec_replies(value)
    }

    async fn expire_ms(&self, key: &str, ttl_ms: u64) -> Result<()> {
        let mut conn = self.conn.clone();

        redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_ms)
            .query_async::<_, ()>(&mut conn)
            .await?;

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
        let mut conn = self.conn.clone();

        let value = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg("-inf")
            .arg(window_start_ms)
            .cmd("ZCARD")
            .arg(key)
            .cmd("ZADD")
            .arg(key)
            .arg(now_ms)
            .arg(member)
            .cmd("PEXPIRE")
            .arg(key)
            .arg(window_ms)
            .query_async::<_, Value>(&mut conn)
            .await?;

        debug!(key = %key, window_start_ms, now_ms, "Sliding log batch executed");
        exec_replies(value)
    }

    async fn ping(&self) -> Result<String> {
        let mut conn = self.conn.clone();
        let pong = redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(pong)
    }
}
