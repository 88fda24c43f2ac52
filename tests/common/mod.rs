//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use sensorhub::models::{NewReading, NewSensor, Position, Sensor};
use sensorhub::{MemoryCache, MemoryReadingsStore, QueryEngine, ReadingsStore};

// ---

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub async fn add_sensor(store: &MemoryReadingsStore, group: &str, index: i32, pos: (f64, f64, f64)) -> Sensor {
    // ---
    let group = match store.find_group(group).await.unwrap() {
        Some(g) => g,
        None => store.insert_group(group).await.unwrap(),
    };
    let sensor = NewSensor {
        group_id: group.id,
        codename: format!("{}{}", group.name, index),
        index,
        position: Position {
            x: pos.0,
            y: pos.1,
            z: pos.2,
        },
        data_rate: 60,
    };
    store.insert_sensor(&sensor).await.unwrap()
}

pub async fn add_reading(
    store: &MemoryReadingsStore,
    sensor: &Sensor,
    temperature: f64,
    transparency: i32,
    species: &str,
    created_at: DateTime<Utc>,
) {
    // ---
    let reading = NewReading {
        reading_key: Uuid::new_v4(),
        sensor_id: sensor.id,
        temperature,
        transparency,
        fish_species_name: species.to_string(),
        fish_species_count: 1,
        created_at,
    };
    assert!(store.insert_reading(&reading).await.unwrap());
}

/// Group "alpha": three sensors on the diagonal of the `[0, 4]` cube with
/// one reading each (10, 12 and 14 degrees).
/// Group "beta": one sensor at (8, 8, 8) that reported Tuna 5 times and
/// Cod and Trout 3 times each.
pub async fn fixture_store() -> Arc<MemoryReadingsStore> {
    // ---
    let store = Arc::new(MemoryReadingsStore::new());

    for (i, (temperature, transparency)) in [(10.0, 40), (12.0, 50), (14.0, 60)].into_iter().enumerate() {
        let p = (i + 1) as f64;
        let sensor = add_sensor(&store, "alpha", i as i32 + 1, (p, p, p)).await;
        add_reading(&store, &sensor, temperature, transparency, "Tuna", at(100)).await;
    }

    let beta = add_sensor(&store, "beta", 1, (8.0, 8.0, 8.0)).await;
    let species = [("Tuna", 5), ("Cod", 3), ("Trout", 3)];
    let mut t = 1_000;
    for (name, times) in species {
        for _ in 0..times {
            add_reading(&store, &beta, 20.0, 70, name, at(t)).await;
            t += 10;
        }
    }

    store
}

pub fn engine(store: Arc<MemoryReadingsStore>) -> (QueryEngine, Arc<MemoryCache>) {
    // ---
    let cache = Arc::new(MemoryCache::new());
    (QueryEngine::new(store, cache.clone()), cache)
}
