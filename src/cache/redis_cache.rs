//! Redis cache backend.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::AggregateCache;
use crate::error::StoreResult;

// ---

/// One process-wide connection, created at startup and dropped at shutdown.
///
/// `ConnectionManager` multiplexes a single connection and reconnects on
/// failure; cloning it is cheap and every clone shares the connection.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        // ---
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

/// PSETEX expiry in milliseconds. PSETEX rejects 0, so shorter TTLs become 1ms.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl AggregateCache for RedisCache {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        // ---
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        // ---
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => {
                let millis = ttl_millis(ttl);
                conn.pset_ex::<_, _, ()>(key, value, millis).await?;
            }
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }
}
