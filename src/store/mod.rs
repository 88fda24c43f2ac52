//! Readings store: durable sensor metadata, readings and rollup snapshots.
//!
//! Every method is one independently committed statement; callers get no
//! cross-call consistency. Aggregate methods return `None` when no reading
//! matched, and leave the policy for that case to the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreResult;
use crate::models::{
    AggregateSnapshot, NewReading, NewSensor, Region, Sensor, SensorGroup, SpeciesCount,
    TimeWindow,
};

mod memory;
mod postgres;

pub use self::memory::MemoryReadingsStore;
pub use self::postgres::PgReadingsStore;

// ---

#[async_trait]
pub trait ReadingsStore: Send + Sync {
    // ---
    async fn find_group(&self, name: &str) -> StoreResult<Option<SensorGroup>>;

    async fn insert_group(&self, name: &str) -> StoreResult<SensorGroup>;

    async fn insert_sensor(&self, sensor: &NewSensor) -> StoreResult<Sensor>;

    /// All sensors, ordered by id.
    async fn list_sensors(&self) -> StoreResult<Vec<Sensor>>;

    /// Append a reading. Inserting the same `reading_key` twice is a no-op;
    /// returns whether a row was written.
    async fn insert_reading(&self, reading: &NewReading) -> StoreResult<bool>;

    /// Mean transparency over every reading of the group's sensors.
    async fn group_transparency_mean(&self, group: &str) -> StoreResult<Option<f64>>;

    /// Mean temperature over every reading of the group's sensors.
    async fn group_temperature_mean(&self, group: &str) -> StoreResult<Option<f64>>;

    /// Number of readings per species for the group, optionally windowed.
    ///
    /// Ordered by count descending, then species name ascending.
    async fn group_species_counts(
        &self,
        group: &str,
        window: &TimeWindow,
        limit: Option<usize>,
    ) -> StoreResult<Vec<SpeciesCount>>;

    async fn region_temperature_min(&self, region: &Region) -> StoreResult<Option<f64>>;

    async fn region_temperature_max(&self, region: &Region) -> StoreResult<Option<f64>>;

    /// Mean temperature of one sensor within `[from, till]`.
    async fn sensor_temperature_mean(
        &self,
        codename: &str,
        from: DateTime<Utc>,
        till: DateTime<Utc>,
    ) -> StoreResult<Option<f64>>;

    /// Append one snapshot per group that has readings, stamped `at`.
    async fn record_rollup(&self, at: DateTime<Utc>) -> StoreResult<Vec<AggregateSnapshot>>;
}
