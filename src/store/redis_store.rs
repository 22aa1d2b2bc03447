//! Redis-backed counter store.
//!
//! Each key is a sorted set of admission timestamps (milliseconds, taken
//! from the Redis server clock so every instance agrees on "now"). Pruning,
//! counting and recording happen inside one Lua script, which Redis runs
//! atomically. The key's TTL is refreshed to the window on every admission,
//! so idle keys disappear without explicit deletes.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{RedisError, Script};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Acquisition, CounterStore};
use crate::error::{CheckError, Result, TollgateError};
use crate::ratelimit::QuotaPolicy;

/// KEYS[1] = quota key, ARGV[1] = limit, ARGV[2] = window in ms,
/// ARGV[3] = unique member for this admission.
///
/// Returns `{admitted, count}` where `admitted` is 1 or 0.
const ACQUIRE_SCRIPT: &str = r#"
local key = KEYS[1]
local limit = tonumber(ARGV[1])
local window_ms = tonumber(ARGV[2])

-- TIME is non-deterministic; older servers refuse writes after it unless
-- the script is replicated as its effects.
redis.replicate_commands()

local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000 + math.floor(tonumber(t[2]) / 1000)

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window_ms)
local count = redis.call('ZCARD', key)

if count < limit then
  redis.call('ZADD', key, now, ARGV[3])
  redis.call('PEXPIRE', key, window_ms)
  return {1, count + 1}
end

return {0, count}
"#;

/// Counter store shared by every instance pointed at the same Redis.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    script: Script,
}

impl RedisStore {
    /// Connect to `url` and verify the server answers within `timeout`.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| TollgateError::Config(format!("Invalid redis URL: {}", e)))?;

        let mut connection = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                CheckError::StoreUnavailable(format!("connecting timed out after {:?}", timeout))
            })?
            .map_err(classify)?;

        let _: String = tokio::time::timeout(timeout, redis::cmd("PING").query_async(&mut connection))
            .await
            .map_err(|_| CheckError::StoreUnavailable(format!("PING timed out after {:?}", timeout)))?
            .map_err(classify)?;

        debug!("Connected to redis counter store");

        Ok(Self {
            connection,
            script: Script::new(ACQUIRE_SCRIPT),
        })
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn acquire(
        &self,
        key: &str,
        policy: &QuotaPolicy,
    ) -> std::result::Result<Acquisition, CheckError> {
        let mut connection = self.connection.clone();
        let member = Uuid::new_v4().to_string();

        let reply: Vec<i64> = self
            .script
            .key(key)
            .arg(policy.limit())
            .arg(policy.window_ms())
            .arg(member)
            .invoke_async(&mut connection)
            .await
            .map_err(classify)?;

        parse_reply(&reply)
    }
}

/// Interpret the `{admitted, count}` pair returned by the script.
fn parse_reply(reply: &[i64]) -> std::result::Result<Acquisition, CheckError> {
    match *reply {
        [flag @ (0 | 1), count] if count >= 0 => Ok(Acquisition {
            admitted: flag == 1,
            count: count as u64,
        }),
        _ => {
            warn!(reply = ?reply, "Unexpected reply from acquire script");
            Err(CheckError::StoreProtocol(format!(
                "unexpected acquire script reply: {:?}",
                reply
            )))
        }
    }
}

/// Connection and timeout failures mean the store is unavailable; anything
/// else means it answered in a way we did not expect.
fn classify(err: RedisError) -> CheckError {
    if err.is_timeout()
        || err.is_io_error()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
    {
        CheckError::StoreUnavailable(err.to_string())
    } else {
        CheckError::StoreProtocol(err.to_string())
    }
}
