//! Redis backend for the shared counters, the cache and the audit queue.
//!
//! One multiplexed [`ConnectionManager`] serves all three roles; it
//! reconnects on its own after a dropped connection.

use std::time::Duration;

use async_trait::async_trait;
use hip_core::StoreError;
use redis::aio::ConnectionManager;
use redis::{cmd, pipe, AsyncCommands, Client, Script};
use tracing::debug;

use crate::keys::{CacheKey, CounterKey};
use crate::traits::{AuditQueue, CacheLookup, CacheStore, CounterSnapshot, CounterStore};

/// INCR and PEXPIRE in one server-side step. The expiry is also restored
/// if a previous writer left the key without one.
const INCR_WITH_EXPIRY: &str = r#"
local count = redis.call('INCR', KEYS[1])
local ttl = redis.call('PTTL', KEYS[1])
if count == 1 or ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
"#;

/// As [`INCR_WITH_EXPIRY`], and the increment that reaches `ARGV[2] + 1`
/// replaces the expiry with `ARGV[3]` before the script returns.
const INCR_WITH_BREACH: &str = r#"
local count = redis.call('INCR', KEYS[1])
local ttl = redis.call('PTTL', KEYS[1])
if count == 1 or ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
if count == tonumber(ARGV[2]) + 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[3])
    ttl = tonumber(ARGV[3])
end
return {count, ttl}
"#;

/// Redis-backed store.
#[derive(Clone)]
pub struct RedisBackend {
    connection: ConnectionManager,
    incr_script: Script,
    breach_script: Script,
}

impl RedisBackend {
    /// Open a managed connection to `url`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(map_redis_error)?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(map_redis_error)?;
        debug!("Connected to redis");
        Ok(Self {
            connection,
            incr_script: Script::new(INCR_WITH_EXPIRY),
            breach_script: Script::new(INCR_WITH_BREACH),
        })
    }
}

/// Reduce a driver error to a [`StoreError`]. Transport failures map to
/// `Unavailable`; everything else is an opaque backend error.
fn map_redis_error(e: redis::RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout()
    {
        StoreError::Unavailable {
            reason: e.to_string(),
        }
    } else {
        StoreError::backend(e)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// PTTL reply to a remaining duration. Negative replies mean no expiry or
/// no key.
fn ttl_from_pttl(pttl: i64) -> Option<Duration> {
    u64::try_from(pttl).ok().map(Duration::from_millis)
}

#[async_trait]
impl CounterStore for RedisBackend {
    async fn incr_with_expiry(
        &self,
        key: &CounterKey,
        window: Duration,
    ) -> Result<CounterSnapshot, StoreError> {
        let mut conn = self.connection.clone();
        let (count, pttl): (i64, i64) = self
            .incr_script
            .key(key.encode())
            .arg(millis(window))
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        Ok(CounterSnapshot {
            count: u64::try_from(count).unwrap_or(0),
            ttl: ttl_from_pttl(pttl),
        })
    }

    async fn incr_with_breach(
        &self,
        key: &CounterKey,
        window: Duration,
        ceiling: u64,
        cool_down: Duration,
    ) -> Result<CounterSnapshot, StoreError> {
        let mut conn = self.connection.clone();
        let (count, pttl): (i64, i64) = self
            .breach_script
            .key(key.encode())
            .arg(millis(window))
            .arg(ceiling)
            .arg(millis(cool_down))
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        Ok(CounterSnapshot {
            count: u64::try_from(count).unwrap_or(0),
            ttl: ttl_from_pttl(pttl),
        })
    }
}

#[async_trait]
impl CacheStore for RedisBackend {
    async fn get(&self, key: &CacheKey) -> Result<CacheLookup, StoreError> {
        let mut conn = self.connection.clone();
        let encoded = key.encode();
        let (bytes, pttl): (Option<Vec<u8>>, i64) = pipe()
            .get(&encoded)
            .pttl(&encoded)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        Ok(match bytes {
            Some(bytes) => CacheLookup::Hit {
                bytes,
                ttl: ttl_from_pttl(pttl),
            },
            None => CacheLookup::Absent,
        })
    }

    async fn set(&self, key: &CacheKey, bytes: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        cmd("SET")
            .arg(key.encode())
            .arg(bytes)
            .arg("PX")
            .arg(millis(ttl))
            .query_async::<()>(&mut conn)
            .await
            .map_err(map_redis_error)
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let _: () = conn.del(key.encode()).await.map_err(map_redis_error)?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_redis_error)
    }
}

#[async_trait]
impl AuditQueue for RedisBackend {
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let _: () = conn.rpush(queue, payload).await.map_err(map_redis_error)?;
        Ok(())
    }
}
