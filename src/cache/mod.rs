//! Aggregate cache: a lossy key-value memo in front of the readings store.
//!
//! The store stays the source of truth. A present entry was correct when it
//! was written and may be stale by up to its TTL.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{CacheValueError, QueryError, StoreResult};

mod memory;
mod redis_cache;

pub use self::memory::MemoryCache;
pub use self::redis_cache::RedisCache;

// ---

/// Key-value store with optional per-key expiry.
#[async_trait]
pub trait AggregateCache: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Store `value` under `key`. `ttl = None` means the entry never expires.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;
}

/// Separates the segments of every cache key.
pub const KEY_SEPARATOR: char = ':';

/// Group names and codenames become key segments, so they must not contain
/// the separator. Otherwise `transparency:{group}` could alias a depth bucket
/// and `temperature:{group}` a per-sensor window entry.
pub fn is_key_segment(name: &str) -> bool {
    !name.contains(KEY_SEPARATOR)
}

pub fn group_transparency_key(group: &str) -> String {
    format!("transparency:{group}")
}

pub fn group_temperature_key(group: &str) -> String {
    format!("temperature:{group}")
}

/// Window bounds are part of the key, to the nanosecond, so different
/// windows never share an entry.
pub fn sensor_temperature_key(codename: &str, from: DateTime<Utc>, till: DateTime<Utc>) -> String {
    format!(
        "temperature:{codename}:{}:{}",
        key_instant(from),
        key_instant(till)
    )
}

/// `{secs}.{nanos}` with the nanoseconds zero-padded, defined for every instant.
fn key_instant(at: DateTime<Utc>) -> String {
    format!("{}.{:09}", at.timestamp(), at.timestamp_subsec_nanos())
}

/// Bucket shared by every sensor at the same depth (2 decimal places).
pub fn depth_transparency_key(depth: f64) -> String {
    format!("transparency:depth:{depth:.2}")
}

/// Parse a cached scalar. Malformed values are reported, never read as zero.
pub fn parse_cached<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, CacheValueError> {
    // ---
    raw.trim().parse::<T>().map_err(|_| CacheValueError {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

/// Read-through lookup of an `f64` aggregate.
///
/// Hits are returned as-is. Misses, unreadable entries and cache failures all
/// fall through to `compute`, whose successful result is written back with
/// `ttl`. Errors from `compute` are returned untouched and nothing is cached.
/// Concurrent misses on the same key each recompute; there is no single-flight.
pub async fn read_through<C, F, Fut>(
    cache: &C,
    key: &str,
    ttl: Duration,
    compute: F,
) -> Result<f64, QueryError>
where
    C: AggregateCache + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<f64, QueryError>>,
{
    // ---
    match cache.get(key).await {
        Ok(Some(raw)) => match parse_cached::<f64>(key, &raw) {
            Ok(value) if value.is_finite() => {
                tracing::trace!(key, "Cache hit");
                return Ok(value);
            }
            Ok(_) => tracing::warn!(key, value = %raw, "Non-finite cache value, recomputing"),
            Err(e) => tracing::warn!("{}, recomputing", e),
        },
        Ok(None) => tracing::trace!(key, "Cache miss"),
        Err(e) => tracing::warn!(key, "Cache read failed, recomputing: {}", e),
    }

    let value = compute().await?;

    if let Err(e) = cache.set(key, &value.to_string(), Some(ttl)).await {
        tracing::warn!(key, "Cache write failed: {}", e);
    }
    Ok(value)
}
