//! Query engine: the analytical operations over accumulated readings.
//!
//! # Contract
//! - Group and per-sensor averages fail with `NotFound` when no reading
//!   matches; a group or sensor that exists is expected to have data.
//! - Region extrema return `0.0` for an empty box, which is a normal outcome
//!   in sparse 3-D space.
//! - The three averages are memoized through the aggregate cache and may be
//!   stale by up to the cache TTL. Everything else reads the store directly.
//! - Store failures surface as `Transient`; nothing is retried here.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::{
    group_temperature_key, group_transparency_key, is_key_segment, read_through,
    sensor_temperature_key, AggregateCache, KEY_SEPARATOR,
};
use crate::error::QueryError;
use crate::models::{round_to_precision, Region, SpeciesCount, TimeWindow};
use crate::store::ReadingsStore;

// ---

/// Value reported by region queries when the box holds no readings.
pub const EMPTY_REGION_TEMPERATURE: f64 = 0.0;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(10);

/// Names that would escape their cache key segment cannot exist in the
/// store, and must not be looked up in the cache either.
fn cacheable_name(kind: &str, name: &str) -> Result<(), QueryError> {
    // ---
    if is_key_segment(name) {
        Ok(())
    } else {
        Err(QueryError::InvalidArgument(format!(
            "{kind} '{name}' contains '{KEY_SEPARATOR}'"
        )))
    }
}

pub struct QueryEngine {
    store: Arc<dyn ReadingsStore>,
    cache: Arc<dyn AggregateCache>,
    cache_ttl: Duration,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn ReadingsStore>, cache: Arc<dyn AggregateCache>) -> Self {
        Self {
            store,
            cache,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Mean transparency of every reading in the group, 2 decimal places.
    pub async fn group_transparency_average(&self, group: &str) -> Result<f64, QueryError> {
        // ---
        cacheable_name("group", group)?;
        let key = group_transparency_key(group);
        read_through(self.cache.as_ref(), &key, self.cache_ttl, || async move {
            self.store
                .group_transparency_mean(group)
                .await?
                .map(|mean| round_to_precision(mean, 2))
                .ok_or_else(|| QueryError::not_found(format!("transparency of group '{group}'")))
        })
        .await
    }

    /// Mean temperature of every reading in the group, 2 decimal places.
    pub async fn group_temperature_average(&self, group: &str) -> Result<f64, QueryError> {
        // ---
        cacheable_name("group", group)?;
        let key = group_temperature_key(group);
        read_through(self.cache.as_ref(), &key, self.cache_ttl, || async move {
            self.store
                .group_temperature_mean(group)
                .await?
                .map(|mean| round_to_precision(mean, 2))
                .ok_or_else(|| QueryError::not_found(format!("temperature of group '{group}'")))
        })
        .await
    }

    /// Readings per species for the group. Empty when there is nothing yet.
    pub async fn group_species(&self, group: &str) -> Result<BTreeMap<String, i64>, QueryError> {
        // ---
        let counts = self
            .store
            .group_species_counts(group, &TimeWindow::default(), None)
            .await?;
        Ok(counts.into_iter().map(|c| (c.species, c.count)).collect())
    }

    /// The `n` most reported species in the group within `window`.
    ///
    /// Ranked by count descending; equal counts are ordered by species name
    /// ascending. Returns every species when fewer than `n` exist.
    pub async fn top_group_species(
        &self,
        group: &str,
        n: usize,
        window: &TimeWindow,
    ) -> Result<Vec<SpeciesCount>, QueryError> {
        // ---
        if n == 0 {
            return Ok(Vec::new());
        }
        let ranked = self
            .store
            .group_species_counts(group, window, Some(n))
            .await?;
        Ok(ranked)
    }

    pub async fn region_min_temperature(&self, region: &Region) -> Result<f64, QueryError> {
        // ---
        let min = self.store.region_temperature_min(region).await?;
        Ok(min.unwrap_or(EMPTY_REGION_TEMPERATURE))
    }

    pub async fn region_max_temperature(&self, region: &Region) -> Result<f64, QueryError> {
        // ---
        let max = self.store.region_temperature_max(region).await?;
        Ok(max.unwrap_or(EMPTY_REGION_TEMPERATURE))
    }

    /// Mean temperature of one sensor within `[from, till]`, 2 decimal places.
    pub async fn sensor_temperature_average(
        &self,
        codename: &str,
        from: DateTime<Utc>,
        till: DateTime<Utc>,
    ) -> Result<f64, QueryError> {
        // ---
        cacheable_name("sensor", codename)?;
        let key = sensor_temperature_key(codename, from, till);
        read_through(self.cache.as_ref(), &key, self.cache_ttl, || async move {
            self.store
                .sensor_temperature_mean(codename, from, till)
                .await?
                .map(|mean| round_to_precision(mean, 2))
                .ok_or_else(|| {
                    QueryError::not_found(format!(
                        "temperature of sensor '{codename}' between {from} and {till}"
                    ))
                })
        })
        .await
    }
}
