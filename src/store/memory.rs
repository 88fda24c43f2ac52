//! In-process readings store with client-side reduction.
//!
//! Observable semantics match the PostgreSQL store, including the species
//! ordering (count descending, name ascending), idempotent inserts and
//! unique group names and codenames.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::ReadingsStore;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    AggregateSnapshot, NewReading, NewSensor, Reading, Region, Sensor, SensorGroup,
    SpeciesCount, TimeWindow,
};

// ---

#[derive(Debug, Default)]
struct Tables {
    groups: Vec<SensorGroup>,
    sensors: Vec<Sensor>,
    readings: Vec<Reading>,
    reading_keys: HashSet<Uuid>,
    snapshots: Vec<AggregateSnapshot>,
}

impl Tables {
    fn group_sensor_ids(&self, group: &str) -> HashSet<i32> {
        // ---
        let Some(group) = self.groups.iter().find(|g| g.name == group) else {
            return HashSet::new();
        };
        self.sensors
            .iter()
            .filter(|s| s.group_id == group.id)
            .map(|s| s.id)
            .collect()
    }

    fn group_readings<'a>(&'a self, group: &str) -> impl Iterator<Item = &'a Reading> + 'a {
        let ids = self.group_sensor_ids(group);
        self.readings.iter().filter(move |r| ids.contains(&r.sensor_id))
    }

    fn region_temperatures<'a>(&'a self, region: &Region) -> impl Iterator<Item = f64> + 'a {
        // ---
        let ids: HashSet<i32> = self
            .sensors
            .iter()
            .filter(|s| region.contains(&s.position))
            .map(|s| s.id)
            .collect();
        self.readings
            .iter()
            .filter(move |r| ids.contains(&r.sensor_id))
            .map(|r| r.temperature)
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    // ---
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Rank species by count descending, then name ascending.
pub(crate) fn rank_species(counts: HashMap<String, i64>) -> Vec<SpeciesCount> {
    // ---
    let mut ranked: Vec<SpeciesCount> = counts
        .into_iter()
        .map(|(species, count)| SpeciesCount { species, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.species.cmp(&b.species)));
    ranked
}

#[derive(Debug, Default)]
pub struct MemoryReadingsStore {
    tables: RwLock<Tables>,
}

impl MemoryReadingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored readings.
    pub async fn reading_count(&self) -> usize {
        self.tables.read().await.readings.len()
    }

    /// Every snapshot written so far, oldest first.
    pub async fn snapshots(&self) -> Vec<AggregateSnapshot> {
        self.tables.read().await.snapshots.clone()
    }
}

#[async_trait]
impl ReadingsStore for MemoryReadingsStore {
    async fn find_group(&self, name: &str) -> StoreResult<Option<SensorGroup>> {
        // ---
        let tables = self.tables.read().await;
        Ok(tables.groups.iter().find(|g| g.name == name).cloned())
    }

    async fn insert_group(&self, name: &str) -> StoreResult<SensorGroup> {
        // ---
        let mut tables = self.tables.write().await;
        if tables.groups.iter().any(|g| g.name == name) {
            return Err(StoreError::Conflict(format!("group '{name}' already exists")));
        }
        let group = SensorGroup {
            id: tables.groups.len() as i32 + 1,
            name: name.to_string(),
        };
        tables.groups.push(group.clone());
        Ok(group)
    }

    async fn insert_sensor(&self, sensor: &NewSensor) -> StoreResult<Sensor> {
        // ---
        let mut tables = self.tables.write().await;
        if tables.sensors.iter().any(|s| s.codename == sensor.codename) {
            return Err(StoreError::Conflict(format!(
                "sensor '{}' already exists",
                sensor.codename
            )));
        }
        let stored = Sensor {
            id: tables.sensors.len() as i32 + 1,
            group_id: sensor.group_id,
            codename: sensor.codename.clone(),
            index: sensor.index,
            position: sensor.position,
            data_rate: sensor.data_rate,
        };
        tables.sensors.push(stored.clone());
        Ok(stored)
    }

    async fn list_sensors(&self) -> StoreResult<Vec<Sensor>> {
        Ok(self.tables.read().await.sensors.clone())
    }

    async fn insert_reading(&self, reading: &NewReading) -> StoreResult<bool> {
        // ---
        let mut tables = self.tables.write().await;
        if !tables.reading_keys.insert(reading.reading_key) {
            return Ok(false);
        }
        let id = tables.readings.len() as i64 + 1;
        tables.readings.push(Reading {
            id,
            reading_key: reading.reading_key,
            sensor_id: reading.sensor_id,
            temperature: reading.temperature,
            transparency: reading.transparency,
            fish_species_name: reading.fish_species_name.clone(),
            fish_species_count: reading.fish_species_count,
            created_at: reading.created_at,
        });
        Ok(true)
    }

    async fn group_transparency_mean(&self, group: &str) -> StoreResult<Option<f64>> {
        // ---
        let tables = self.tables.read().await;
        Ok(mean(tables.group_readings(group).map(|r| f64::from(r.transparency))))
    }

    async fn group_temperature_mean(&self, group: &str) -> StoreResult<Option<f64>> {
        // ---
        let tables = self.tables.read().await;
        Ok(mean(tables.group_readings(group).map(|r| r.temperature)))
    }

    async fn group_species_counts(
        &self,
        group: &str,
        window: &TimeWindow,
        limit: Option<usize>,
    ) -> StoreResult<Vec<SpeciesCount>> {
        // ---
        let tables = self.tables.read().await;
        let mut counts: HashMap<String, i64> = HashMap::new();
        for reading in tables
            .group_readings(group)
            .filter(|r| window.contains(r.created_at))
        {
            *counts.entry(reading.fish_species_name.clone()).or_default() += 1;
        }

        let mut ranked = rank_species(counts);
        if let Some(limit) = limit {
            ranked.truncate(limit);
        }
        Ok(ranked)
    }

    async fn region_temperature_min(&self, region: &Region) -> StoreResult<Option<f64>> {
        // ---
        let tables = self.tables.read().await;
        Ok(tables.region_temperatures(region).reduce(f64::min))
    }

    async fn region_temperature_max(&self, region: &Region) -> StoreResult<Option<f64>> {
        // ---
        let tables = self.tables.read().await;
        Ok(tables.region_temperatures(region).reduce(f64::max))
    }

    async fn sensor_temperature_mean(
        &self,
        codename: &str,
        from: DateTime<Utc>,
        till: DateTime<Utc>,
    ) -> StoreResult<Option<f64>> {
        // ---
        let tables = self.tables.read().await;
        let Some(sensor) = tables.sensors.iter().find(|s| s.codename == codename) else {
            return Ok(None);
        };
        let window = TimeWindow {
            from: Some(from),
            till: Some(till),
        };
        Ok(mean(
            tables
                .readings
                .iter()
                .filter(|r| r.sensor_id == sensor.id && window.contains(r.created_at))
                .map(|r| r.temperature),
        ))
    }

    async fn record_rollup(&self, at: DateTime<Utc>) -> StoreResult<Vec<AggregateSnapshot>> {
        // ---
        let mut tables = self.tables.write().await;

        let group_of: HashMap<i32, i32> = tables.sensors.iter().map(|s| (s.id, s.group_id)).collect();
        // group_id -> (temperature sum, transparency sum, n)
        let mut sums: BTreeMap<i32, (f64, f64, usize)> = BTreeMap::new();
        for reading in &tables.readings {
            if let Some(group_id) = group_of.get(&reading.sensor_id) {
                let entry = sums.entry(*group_id).or_insert((0.0, 0.0, 0));
                entry.0 += reading.temperature;
                entry.1 += f64::from(reading.transparency);
                entry.2 += 1;
            }
        }

        let mut written = Vec::with_capacity(sums.len());
        for (group_id, (temperature, transparency, n)) in sums {
            let snapshot = AggregateSnapshot {
                id: tables.snapshots.len() as i64 + 1,
                group_id,
                avg_temperature: temperature / n as f64,
                avg_transparency: transparency / n as f64,
                created_at: at,
            };
            tables.snapshots.push(snapshot.clone());
            written.push(snapshot);
        }
        Ok(written)
    }
}
