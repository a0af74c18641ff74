//! Redis repository.
//!
//! Every mutation runs as a single Lua script so that the read, the
//! condition and the write happen atomically on the server, regardless of how
//! many proxy workers share the instance.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, trace};

use crate::store::{
    breaker_key, rate_limit_key, BreakerRepository, BreakerState, StoreError, StoreResult,
};

const INCREMENT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

const SAVE_BREAKER_SCRIPT: &str = r#"
local current = tonumber(redis.call('HGET', KEYS[1], 'version')) or 0
if current ~= tonumber(ARGV[1]) then
    return 0
end
redis.call('HSET', KEYS[1],
    'error_count', ARGV[2],
    'open_since_epoch_ms', ARGV[3],
    'version', current + 1)
return 1
"#;

/// Redis-backed repository shared by all proxy workers.
#[derive(Clone)]
pub struct RedisRepository {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisRepository {
    /// Connect to Redis (e.g. `redis://localhost:6379`).
    pub async fn connect(url: &str, prefix: impl Into<String>) -> StoreResult<Self> {
        debug!(url = %url, "Connecting to Redis breaker repository");
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            prefix: prefix.into(),
        })
    }
}

#[async_trait]
impl BreakerRepository for RedisRepository {
    async fn increment_and_get(&self, key: &str, window: u64, ttl: Duration) -> StoreResult<u64> {
        let full_key = rate_limit_key(&self.prefix, key, window);
        let mut conn = self.conn.clone();

        let count: i64 = redis::Script::new(INCREMENT_SCRIPT)
            .key(&full_key)
            .arg(ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;

        trace!(key = %key, window = window, count = count, "Counter incremented");
        u64::try_from(count).map_err(|_| StoreError::Corrupt {
            key: full_key,
            reason: format!("negative counter {}", count),
        })
    }

    async fn load_breaker_state(&self, key: &str) -> StoreResult<BreakerState> {
        let full_key = breaker_key(&self.prefix, key);
        let mut conn = self.conn.clone();

        let fields: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(&full_key)
            .arg("error_count")
            .arg("open_since_epoch_ms")
            .arg("version")
            .query_async(&mut conn)
            .await?;

        let field = |index: usize, name: &str| -> StoreResult<u64> {
            match fields.get(index).cloned().flatten() {
                None => Ok(0),
                Some(raw) => raw.parse().map_err(|_| StoreError::Corrupt {
                    key: full_key.clone(),
                    reason: format!("{} is not a number: {:?}", name, raw),
                }),
            }
        };

        let error_count = field(0, "error_count")?;
        Ok(BreakerState {
            error_count: u32::try_from(error_count).map_err(|_| StoreError::Corrupt {
                key: full_key.clone(),
                reason: format!("error_count out of range: {}", error_count),
            })?,
            open_since_epoch_ms: field(1, "open_since_epoch_ms")?,
            version: field(2, "version")?,
        })
    }

    async fn save_breaker_state(&self, key: &str, state: &BreakerState) -> StoreResult<bool> {
        let full_key = breaker_key(&self.prefix, key);
        let mut conn = self.conn.clone();

        let written: i32 = redis::Script::new(SAVE_BREAKER_SCRIPT)
            .key(&full_key)
            .arg(state.version)
            .arg(state.error_count)
            .arg(state.open_since_epoch_ms)
            .invoke_async(&mut conn)
            .await?;

        if written == 0 {
            trace!(key = %key, expected = state.version, "Breaker write lost version race");
        }
        Ok(written == 1)
    }

    fn store_type(&self) -> &'static str {
        "redis"
    }
}

impl std::fmt::Debug for RedisRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRepository")
            .field("prefix", &self.prefix)
            .finish()
    }
}
