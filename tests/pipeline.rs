//! Generator and rollup running against the in-process backends.
mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;

use sensorhub::error::{StoreError, StoreResult};
use sensorhub::models::{
    AggregateSnapshot, NewReading, NewSensor, Region, Sensor, SensorGroup, SpeciesCount,
    TimeWindow,
};
use sensorhub::supervisor::{run_job, shutdown_channel, Backoff, Job, Pacing};
use sensorhub::{
    seed, Generator, MemoryCache, MemoryReadingsStore, QueryEngine, ReadingsStore, RollupJob,
};

// ---

const GROUPS: [&str; 2] = ["north", "south"];
const SENSORS_PER_GROUP: u32 = 3;

async fn seeded_store() -> Result<Arc<MemoryReadingsStore>> {
    // ---
    let store = Arc::new(MemoryReadingsStore::new());
    let groups: Vec<String> = GROUPS.iter().map(|g| g.to_string()).collect();
    let mut rng = StdRng::seed_from_u64(7);
    let created = seed::seed_sensors(store.as_ref(), &groups, SENSORS_PER_GROUP, &mut rng).await?;
    assert_eq!(created.len(), 6);
    Ok(store)
}

/// Delegates to a memory store. The first `failures` inserts are committed
/// and then reported as failed, like a connection dropped after COMMIT.
struct AmbiguousCommitStore {
    inner: MemoryReadingsStore,
    failures: usize,
    inserts: AtomicUsize,
}

impl AmbiguousCommitStore {
    fn new(inner: MemoryReadingsStore, failures: usize) -> Self {
        Self {
            inner,
            failures,
            inserts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ReadingsStore for AmbiguousCommitStore {
    async fn find_group(&self, name: &str) -> StoreResult<Option<SensorGroup>> {
        self.inner.find_group(name).await
    }

    async fn insert_group(&self, name: &str) -> StoreResult<SensorGroup> {
        self.inner.insert_group(name).await
    }

    async fn insert_sensor(&self, sensor: &NewSensor) -> StoreResult<Sensor> {
        self.inner.insert_sensor(sensor).await
    }

    async fn list_sensors(&self) -> StoreResult<Vec<Sensor>> {
        self.inner.list_sensors().await
    }

    async fn insert_reading(&self, reading: &NewReading) -> StoreResult<bool> {
        // ---
        let written = self.inner.insert_reading(reading).await?;
        if self.inserts.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(written)
    }

    async fn group_transparency_mean(&self, group: &str) -> StoreResult<Option<f64>> {
        self.inner.group_transparency_mean(group).await
    }

    async fn group_temperature_mean(&self, group: &str) -> StoreResult<Option<f64>> {
        self.inner.group_temperature_mean(group).await
    }

    async fn group_species_counts(
        &self,
        group: &str,
        window: &TimeWindow,
        limit: Option<usize>,
    ) -> StoreResult<Vec<SpeciesCount>> {
        self.inner.group_species_counts(group, window, limit).await
    }

    async fn region_temperature_min(&self, region: &Region) -> StoreResult<Option<f64>> {
        self.inner.region_temperature_min(region).await
    }

    async fn region_temperature_max(&self, region: &Region) -> StoreResult<Option<f64>> {
        self.inner.region_temperature_max(region).await
    }

    async fn sensor_temperature_mean(
        &self,
        codename: &str,
        from: DateTime<Utc>,
        till: DateTime<Utc>,
    ) -> StoreResult<Option<f64>> {
        self.inner.sensor_temperature_mean(codename, from, till).await
    }

    async fn record_rollup(&self, at: DateTime<Utc>) -> StoreResult<Vec<AggregateSnapshot>> {
        self.inner.record_rollup(at).await
    }
}

#[tokio::test]
async fn generated_readings_feed_the_queries() -> Result<()> {
    // ---
    let store = seeded_store().await?;
    let cache = Arc::new(MemoryCache::new());
    let generator = Generator::new(store.clone(), cache.clone(), Some(42));

    let started = Utc::now();
    for _ in 0..5 {
        assert_eq!(generator.generate_once().await?, 6);
    }
    let finished = Utc::now();
    assert_eq!(store.reading_count().await, 30);

    let engine = QueryEngine::new(store.clone(), cache);
    for group in GROUPS {
        let temperature = engine.group_temperature_average(group).await?;
        assert!((10.0..=35.0).contains(&temperature), "{group}: {temperature}");

        let transparency = engine.group_transparency_average(group).await?;
        assert!((0.0..=99.0).contains(&transparency), "{group}: {transparency}");

        let species = engine.group_species(group).await?;
        assert_eq!(species.values().sum::<i64>(), 15);

        let top = engine.top_group_species(group, 2, &TimeWindow::default()).await?;
        assert!(!top.is_empty() && top.len() <= 2);
        assert!(top.windows(2).all(|w| w[0].count >= w[1].count));
    }

    for codename in ["north1", "south3"] {
        let temperature = engine
            .sensor_temperature_average(codename, started, finished)
            .await?;
        assert!((10.0..=35.0).contains(&temperature), "{codename}: {temperature}");
    }
    // Nothing was generated before the run started
    let before = started - chrono::Duration::seconds(60);
    let err = engine
        .sensor_temperature_average("north1", before, before)
        .await
        .unwrap_err();
    assert!(matches!(err, sensorhub::QueryError::NotFound { .. }));

    let everywhere = Region::new(0.0, 10.0, 0.0, 10.0, 0.0, 10.0)?;
    let min = engine.region_min_temperature(&everywhere).await?;
    let max = engine.region_max_temperature(&everywhere).await?;
    assert!(min <= max);
    assert!(min >= 10.0 && max < 35.0);
    Ok(())
}

#[tokio::test]
async fn rollup_snapshots_each_group_with_readings() -> Result<()> {
    // ---
    let store = seeded_store().await?;
    let rollup = RollupJob::new(store.clone());

    // Nothing generated yet
    assert_eq!(rollup.run_cycle().await?, 0);

    let generator = Generator::new(store.clone(), Arc::new(MemoryCache::new()), Some(1));
    generator.generate_once().await?;

    assert_eq!(rollup.run_cycle().await?, 2);
    assert_eq!(rollup.run_cycle().await?, 2);

    let snapshots = store.snapshots().await;
    assert_eq!(snapshots.len(), 4);
    for snapshot in &snapshots {
        assert!((10.0..35.0).contains(&snapshot.avg_temperature));
        assert!((0.0..100.0).contains(&snapshot.avg_transparency));
    }
    Ok(())
}

#[tokio::test]
async fn retried_insert_never_duplicates() -> Result<()> {
    // ---
    let inner = MemoryReadingsStore::new();
    let groups = vec!["reef".to_string()];
    seed::seed_sensors(&inner, &groups, 2, &mut StdRng::seed_from_u64(3)).await?;

    let store = Arc::new(AmbiguousCommitStore::new(inner, 2));
    let generator = Generator::new(store.clone(), Arc::new(MemoryCache::new()), Some(5))
        .with_insert_retries(3, Duration::ZERO);

    assert_eq!(generator.generate_once().await?, 2);

    // Two failed attempts plus the retry that found the row already there
    assert_eq!(store.inserts.load(Ordering::SeqCst), 4);
    assert_eq!(store.inner.reading_count().await, 2);
    Ok(())
}

#[tokio::test]
async fn exhausted_insert_retries_fail_the_cycle() -> Result<()> {
    // ---
    let inner = MemoryReadingsStore::new();
    let groups = vec!["reef".to_string()];
    seed::seed_sensors(&inner, &groups, 1, &mut StdRng::seed_from_u64(3)).await?;

    let store = Arc::new(AmbiguousCommitStore::new(inner, usize::MAX));
    let generator = Generator::new(store.clone(), Arc::new(MemoryCache::new()), Some(5))
        .with_insert_retries(2, Duration::ZERO);

    assert!(generator.generate_once().await.is_err());
    assert_eq!(store.inserts.load(Ordering::SeqCst), 2);
    assert_eq!(store.inner.reading_count().await, 1);
    Ok(())
}

#[tokio::test]
async fn reseeding_is_a_no_op() -> Result<()> {
    // ---
    let store = seeded_store().await?;
    let groups: Vec<String> = GROUPS.iter().map(|g| g.to_string()).collect();
    let again = seed::seed_sensors(store.as_ref(), &groups, 3, &mut StdRng::seed_from_u64(9)).await?;

    assert!(again.is_empty());
    assert_eq!(store.list_sensors().await?.len(), 6);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn supervised_jobs_run_until_shutdown() -> Result<()> {
    // ---
    let store = seeded_store().await?;
    let cache = Arc::new(MemoryCache::new());
    let generator = Generator::new(store.clone(), cache, Some(11));
    let rollup = RollupJob::new(store.clone());
    let backoff = || Backoff::new(Duration::from_millis(100), Duration::from_secs(1));

    let (tx, rx) = shutdown_channel();
    let generating = {
        let rx = rx.clone();
        let every = Pacing::Every(Duration::from_secs(1));
        tokio::spawn(async move { run_job(&generator, every, backoff(), rx).await })
    };
    let rolling = {
        let every = Pacing::Every(Duration::from_secs(2));
        tokio::spawn(async move { run_job(&rollup, every, backoff(), rx).await })
    };

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    tx.send(true)?;

    let generated = generating.await?;
    let rolled_up = rolling.await?;

    // Intervals tick immediately, then once per period
    assert_eq!(generated, 4);
    assert_eq!(rolled_up, 2);
    assert_eq!(store.reading_count().await, 24);
    // The rollup at t=0 may run before the first readings land
    let snapshots = store.snapshots().await.len();
    assert!((2..=4).contains(&snapshots), "{snapshots} snapshots");
    Ok(())
}
