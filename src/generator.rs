//! Telemetry generator: one reading per known sensor per cycle.
//!
//! Temperature rises with depth. Transparency is smoothed per depth bucket
//! through the aggregate cache, so sensors at the same depth tend to agree
//! without the generator tracking per-sensor history.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::cache::{depth_transparency_key, parse_cached, AggregateCache};
use crate::models::{NewReading, Sensor};
use crate::store::ReadingsStore;
use crate::supervisor::Job;

// ---

pub const FISH_SPECIES: [&str; 6] = [
    "Atlantic Cod",
    "Sailfish",
    "Tuna",
    "Salmon",
    "Trout",
    "Barracuda",
];

pub const TEMPERATURE_BASE: f64 = 10.0;
pub const TEMPERATURE_SLOPE: f64 = 2.0;
/// Jitter is drawn from `[0, TEMPERATURE_JITTER)`.
pub const TEMPERATURE_JITTER: f64 = 5.0;

/// Candidates within this distance of the bucket's value are accepted quietly.
pub const TRANSPARENCY_TOLERANCE: i32 = 10;

/// Exclusive upper bound of the observed species count.
pub const MAX_SPECIES_COUNT: i32 = 20;

/// `base + depth * slope + jitter`, jitter uniform in `[0, 5)`.
pub fn sample_temperature<R: Rng>(depth: f64, rng: &mut R) -> f64 {
    TEMPERATURE_BASE + depth * TEMPERATURE_SLOPE + rng.gen_range(0.0..TEMPERATURE_JITTER)
}

/// Outcome of checking a transparency candidate against its bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Smoothed {
    pub value: i32,
    /// Whether the bucket should now remember `value`.
    pub remember: bool,
    /// The bucket had a value and the candidate is further than the tolerance from it.
    pub drifted: bool,
}

/// Apply the depth-bucket smoothing rule.
///
/// The candidate is always emitted unchanged. The bucket learns it only on
/// the first observation; a candidate far from the remembered value is still
/// emitted but does not replace it. Callers must not assume emitted values
/// stay within the tolerance.
pub fn smooth_transparency(candidate: i32, previous: Option<i32>) -> Smoothed {
    // ---
    match previous {
        Some(prev) => Smoothed {
            value: candidate,
            remember: false,
            drifted: (candidate - prev).abs() > TRANSPARENCY_TOLERANCE,
        },
        None => Smoothed {
            value: candidate,
            remember: true,
            drifted: false,
        },
    }
}

/// Random parts of a reading, drawn together so the RNG lock is held once.
#[derive(Debug, Clone, PartialEq)]
struct Draw {
    temperature: f64,
    transparency_candidate: i32,
    species: &'static str,
    species_count: i32,
}

impl Draw {
    fn sample<R: Rng>(depth: f64, rng: &mut R) -> Self {
        // ---
        Self {
            temperature: sample_temperature(depth, rng),
            transparency_candidate: rng.gen_range(0..100),
            species: FISH_SPECIES[rng.gen_range(0..FISH_SPECIES.len())],
            species_count: rng.gen_range(0..MAX_SPECIES_COUNT),
        }
    }
}

pub struct Generator {
    store: Arc<dyn ReadingsStore>,
    cache: Arc<dyn AggregateCache>,
    rng: Mutex<StdRng>,
    insert_attempts: u32,
    retry_delay: Duration,
}

impl Generator {
    pub fn new(
        store: Arc<dyn ReadingsStore>,
        cache: Arc<dyn AggregateCache>,
        seed: Option<u64>,
    ) -> Self {
        // ---
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            store,
            cache,
            rng: Mutex::new(rng),
            insert_attempts: 3,
            retry_delay: Duration::from_millis(100),
        }
    }

    /// Attempts per reading insert (at least 1) and the pause between them.
    pub fn with_insert_retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.insert_attempts = attempts.max(1);
        self.retry_delay = delay;
        self
    }

    /// Transparency for a sensor at `depth`, consulting the depth bucket.
    ///
    /// Cache trouble never blocks generation: an unreadable bucket is
    /// treated as empty and a failed write is only logged.
    pub async fn transparency(&self, depth: f64, candidate: i32) -> i32 {
        // ---
        let key = depth_transparency_key(depth);
        let previous = match self.cache.get(&key).await {
            Ok(Some(raw)) => match parse_cached::<i32>(&key, &raw) {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!("{}, resetting bucket", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key = %key, "Transparency bucket unreadable: {}", e);
                None
            }
        };

        let smoothed = smooth_transparency(candidate, previous);
        if smoothed.drifted {
            tracing::trace!(key = %key, candidate, ?previous, "Candidate outside tolerance");
        }
        if smoothed.remember {
            if let Err(e) = self.cache.set(&key, &smoothed.value.to_string(), None).await {
                tracing::warn!(key = %key, "Transparency bucket write failed: {}", e);
            }
        }
        smoothed.value
    }

    /// Build the next reading for `sensor`.
    pub async fn next_reading(&self, sensor: &Sensor) -> NewReading {
        // ---
        let depth = sensor.position.z;
        let draw = {
            let mut rng = self.rng.lock().await;
            Draw::sample(depth, &mut *rng)
        };
        let transparency = self.transparency(depth, draw.transparency_candidate).await;

        NewReading {
            reading_key: Uuid::new_v4(),
            sensor_id: sensor.id,
            temperature: draw.temperature,
            transparency,
            fish_species_name: draw.species.to_string(),
            fish_species_count: draw.species_count,
            created_at: Utc::now(),
        }
    }

    /// Insert `reading`, retrying the same row on failure.
    async fn persist(&self, reading: &NewReading) -> Result<()> {
        // ---
        let mut attempt = 1;
        loop {
            match self.store.insert_reading(reading).await {
                Ok(written) => {
                    if !written {
                        tracing::debug!(key = %reading.reading_key, "Reading already stored");
                    }
                    return Ok(());
                }
                Err(e) if attempt < self.insert_attempts => {
                    tracing::warn!(
                        sensor_id = reading.sensor_id,
                        attempt,
                        "Insert failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(self.retry_delay * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!(
                            "storing reading {} for sensor {} after {} attempts",
                            reading.reading_key, reading.sensor_id, attempt
                        )
                    })
                }
            }
        }
    }

    /// One pass over every known sensor.
    pub async fn generate_once(&self) -> Result<usize> {
        // ---
        let sensors = self
            .store
            .list_sensors()
            .await
            .context("listing sensors")?;

        for sensor in &sensors {
            let reading = self.next_reading(sensor).await;
            self.persist(&reading).await?;
        }
        Ok(sensors.len())
    }
}

#[async_trait]
impl Job for Generator {
    fn name(&self) -> &'static str {
        "generator"
    }

    async fn run_cycle(&self) -> Result<usize> {
        self.generate_once().await
    }
}
