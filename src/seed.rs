//! One-time bootstrap of sensor groups and their sensors.
//!
//! Idempotent across restarts. The group row and its sensors are separate
//! statements, so a run that failed halfway is completed by the next one:
//! every group ends up with sensors `1..=sensors_per_group`.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use rand::Rng;

use crate::cache::{is_key_segment, KEY_SEPARATOR};
use crate::models::{NewSensor, Position, Sensor};
use crate::store::ReadingsStore;

// ---

/// Sensors are placed uniformly in `[0, EXTENT)` on every axis.
pub const SENSOR_EXTENT: f64 = 10.0;

/// Nominal readings per minute recorded for every seeded sensor.
pub const DEFAULT_DATA_RATE: i32 = 60;

/// Codename of the `index`-th sensor of `group` (1-based).
pub fn sensor_codename(group: &str, index: u32) -> String {
    format!("{group}{index}")
}

/// Create any missing groups, and any missing sensors of existing groups,
/// so each group has `sensors_per_group` sensors.
///
/// Returns the sensors created by this call.
pub async fn seed_sensors<S, R>(
    store: &S,
    groups: &[String],
    sensors_per_group: u32,
    rng: &mut R,
) -> Result<Vec<Sensor>>
where
    S: ReadingsStore + ?Sized,
    R: Rng,
{
    // ---
    for name in groups {
        if !is_key_segment(name) {
            bail!("group name '{name}' must not contain '{KEY_SEPARATOR}'");
        }
    }

    // codename -> group id
    let mut existing: HashMap<String, i32> = store
        .list_sensors()
        .await
        .context("listing sensors")?
        .into_iter()
        .map(|s| (s.codename, s.group_id))
        .collect();
    let mut created = Vec::new();

    for name in groups {
        let group = match store
            .find_group(name)
            .await
            .with_context(|| format!("looking up group '{name}'"))?
        {
            Some(group) => group,
            None => store
                .insert_group(name)
                .await
                .with_context(|| format!("creating group '{name}'"))?,
        };

        let mut added = 0;
        for index in 1..=sensors_per_group {
            let codename = sensor_codename(name, index);
            match existing.get(&codename) {
                Some(&owner) if owner == group.id => continue,
                Some(_) => {
                    bail!("codename '{codename}' of group '{name}' belongs to another group")
                }
                None => {}
            }
            let sensor = NewSensor {
                group_id: group.id,
                codename,
                index: index as i32,
                position: Position {
                    x: rng.gen_range(0.0..SENSOR_EXTENT),
                    y: rng.gen_range(0.0..SENSOR_EXTENT),
                    z: rng.gen_range(0.0..SENSOR_EXTENT),
                },
                data_rate: DEFAULT_DATA_RATE,
            };
            let sensor = store
                .insert_sensor(&sensor)
                .await
                .with_context(|| format!("creating sensor '{}'", sensor.codename))?;
            existing.insert(sensor.codename.clone(), group.id);
            created.push(sensor);
            added += 1;
        }

        if added > 0 {
            tracing::info!(group = %name, sensors = added, "Group seeded");
        } else {
            tracing::debug!(group = %name, "Group already seeded");
        }
    }

    Ok(created)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::store::MemoryReadingsStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        // ---
        let store = MemoryReadingsStore::new();
        let groups = vec!["alpha".to_string(), "beta".to_string()];
        let mut rng = StdRng::seed_from_u64(9);

        let first = seed_sensors(&store, &groups, 3, &mut rng).await.unwrap();
        assert_eq!(first.len(), 6);

        let second = seed_sensors(&store, &groups, 3, &mut rng).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(store.list_sensors().await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_seeded_sensor_layout() {
        // ---
        let store = MemoryReadingsStore::new();
        let mut rng = StdRng::seed_from_u64(1);
        let sensors = seed_sensors(&store, &["gamma".to_string()], 3, &mut rng)
            .await
            .unwrap();

        let codenames: Vec<&str> = sensors.iter().map(|s| s.codename.as_str()).collect();
        assert_eq!(codenames, vec!["gamma1", "gamma2", "gamma3"]);
        for (i, sensor) in sensors.iter().enumerate() {
            assert_eq!(sensor.index, i as i32 + 1);
            assert_eq!(sensor.data_rate, DEFAULT_DATA_RATE);
            for v in [sensor.position.x, sensor.position.y, sensor.position.z] {
                assert!((0.0..SENSOR_EXTENT).contains(&v));
            }
        }
    }

    #[tokio::test]
    async fn test_partially_seeded_group_is_completed() {
        // ---
        let store = MemoryReadingsStore::new();
        let group = store.insert_group("delta").await.unwrap();
        store
            .insert_sensor(&NewSensor {
                group_id: group.id,
                codename: "delta1".to_string(),
                index: 1,
                position: Position { x: 1.0, y: 1.0, z: 1.0 },
                data_rate: DEFAULT_DATA_RATE,
            })
            .await
            .unwrap();

        let mut rng = StdRng::seed_from_u64(4);
        let sensors = seed_sensors(&store, &["delta".to_string()], 3, &mut rng)
            .await
            .unwrap();

        let codenames: Vec<&str> = sensors.iter().map(|s| s.codename.as_str()).collect();
        assert_eq!(codenames, vec!["delta2", "delta3"]);
        assert!(sensors.iter().all(|s| s.group_id == group.id));
        assert_eq!(store.list_sensors().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_codename_owned_by_other_group_is_rejected() {
        // ---
        let store = MemoryReadingsStore::new();
        let mut rng = StdRng::seed_from_u64(5);
        seed_sensors(&store, &["reef".to_string()], 11, &mut rng)
            .await
            .unwrap();

        // "reef1" sensor 1 would be "reef11", already taken by group "reef"
        let err = seed_sensors(&store, &["reef1".to_string()], 1, &mut rng)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("reef11"));
    }

    #[tokio::test]
    async fn test_separator_in_group_name_is_rejected() {
        // ---
        let store = MemoryReadingsStore::new();
        let mut rng = StdRng::seed_from_u64(2);
        let groups = vec!["alpha".to_string(), "depth:1.00".to_string()];

        assert!(seed_sensors(&store, &groups, 3, &mut rng).await.is_err());
        // Validation happens before anything is written
        assert!(store.find_group("alpha").await.unwrap().is_none());
        assert!(store.list_sensors().await.unwrap().is_empty());
    }
}
