//! Redis-backed count cache shared by every counter instance.
//!
//! Each count key `k` has a companion `k:epoch` counter. A delete removes `k`
//! and increments `k:epoch` in one MULTI block; conditional writes compare the
//! counter inside a Lua script, so the check and the write are atomic.

use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client, Script, aio::ConnectionManager};

use super::keys::CountKey;
use super::{CacheError, CountCache, Epoch};

const EPOCH_SUFFIX: &str = ":epoch";

/// KEYS[1] = count key, KEYS[2] = epoch key;
/// ARGV[1] = value, ARGV[2] = observed epoch, ARGV[3] = ttl seconds.
const SET_IF_UNCHANGED: &str = r#"
local current = tonumber(redis.call('GET', KEYS[2]) or '0')
if current ~= tonumber(ARGV[2]) then
    return 0
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[3])
return 1
"#;

#[derive(Clone)]
pub struct RedisCountCache {
    manager: ConnectionManager,
    ttl_secs: u64,
    set_if_unchanged: Script,
}

impl RedisCountCache {
    pub async fn connect(url: &str, ttl: Duration) -> Result<Self, CacheError> {
        let client = Client::open(url).map_err(CacheError::unavailable)?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(CacheError::unavailable)?;

        Ok(Self {
            manager,
            ttl_secs: expiry_secs(ttl),
            set_if_unchanged: Script::new(SET_IF_UNCHANGED),
        })
    }
}

/// `SET EX` rejects zero, so sub-second TTLs round up to one second.
fn expiry_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

fn epoch_key(key: &CountKey) -> String {
    format!("{}{EPOCH_SUFFIX}", key.as_str())
}

fn parse_count(key: &CountKey, raw: Option<String>) -> Result<Option<u64>, CacheError> {
    raw.map(|value| {
        value
            .trim()
            .parse::<u64>()
            .map_err(|_| CacheError::corrupt(key, value))
    })
    .transpose()
}

#[async_trait]
impl CountCache for RedisCountCache {
    async fn get(&self, key: &CountKey) -> Result<Option<u64>, CacheError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn
            .get(key.as_str())
            .await
            .map_err(CacheError::unavailable)?;

        parse_count(key, raw)
    }

    async fn set(&self, key: &CountKey, value: u64) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(key.as_str(), value, self.ttl_secs)
            .await
            .map_err(CacheError::unavailable)
    }

    async fn delete(&self, key: &CountKey) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("DEL")
            .arg(key.as_str())
            .ignore()
            .cmd("INCR")
            .arg(epoch_key(key))
            .ignore();

        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(CacheError::unavailable)
    }

    async fn epoch(&self, key: &CountKey) -> Result<Epoch, CacheError> {
        let mut conn = self.manager.clone();
        let raw: Option<u64> = conn
            .get(epoch_key(key))
            .await
            .map_err(CacheError::unavailable)?;

        Ok(raw.unwrap_or(0))
    }

    async fn set_if_unchanged(
        &self,
        key: &CountKey,
        value: u64,
        seen: Epoch,
    ) -> Result<bool, CacheError> {
        let mut conn = self.manager.clone();
        let written: i64 = self
            .set_if_unchanged
            .key(key.as_str())
            .key(epoch_key(key))
            .arg(value)
            .arg(seen)
            .arg(self.ttl_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(CacheError::unavailable)?;

        Ok(written == 1)
    }
}
