//! PostgreSQL readings store. Aggregation is pushed down into SQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::ReadingsStore;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    AggregateSnapshot, NewReading, NewSensor, Region, Sensor, SensorGroup, SpeciesCount,
    TimeWindow,
};

// ---

const SENSOR_COLUMNS: &str = "id, group_id, codename, sensor_index, x, y, z, data_rate";

/// Readings joined to their sensor's group.
const GROUP_READINGS: &str = r#"
    FROM sensor_data sd
    JOIN sensors s ON s.id = sd.sensor_id
    JOIN sensor_groups sg ON sg.id = s.group_id
    WHERE sg.name = $1
"#;

/// Readings whose sensor lies in the closed box `$1..$6`.
const REGION_READINGS: &str = r#"
    FROM sensor_data sd
    JOIN sensors s ON s.id = sd.sensor_id
    WHERE s.x BETWEEN $1 AND $2
      AND s.y BETWEEN $3 AND $4
      AND s.z BETWEEN $5 AND $6
"#;

/// Report a UNIQUE violation as a conflict on `what`.
fn unique_conflict(err: sqlx::Error, what: impl FnOnce() -> String) -> StoreError {
    // ---
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(format!("{} already exists", what()))
        }
        _ => StoreError::Database(err),
    }
}

#[derive(Debug, Clone)]
pub struct PgReadingsStore {
    pool: PgPool,
}

impl PgReadingsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn region_extreme(&self, aggregate: &str, region: &Region) -> StoreResult<Option<f64>> {
        // ---
        let sql = format!("SELECT {aggregate}(sd.temperature) {REGION_READINGS}");
        let value = sqlx::query_scalar::<_, Option<f64>>(&sql)
            .bind(region.x_min)
            .bind(region.x_max)
            .bind(region.y_min)
            .bind(region.y_max)
            .bind(region.z_min)
            .bind(region.z_max)
            .fetch_one(&self.pool)
            .await?;
        Ok(value)
    }
}

#[async_trait]
impl ReadingsStore for PgReadingsStore {
    async fn find_group(&self, name: &str) -> StoreResult<Option<SensorGroup>> {
        // ---
        let group = sqlx::query_as::<_, SensorGroup>(
            "SELECT id, name FROM sensor_groups WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(group)
    }

    async fn insert_group(&self, name: &str) -> StoreResult<SensorGroup> {
        // ---
        let group = sqlx::query_as::<_, SensorGroup>(
            "INSERT INTO sensor_groups (name) VALUES ($1) RETURNING id, name",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_conflict(e, || format!("group '{name}'")))?;
        Ok(group)
    }

    async fn insert_sensor(&self, sensor: &NewSensor) -> StoreResult<Sensor> {
        // ---
        let sql = format!(
            r#"
            INSERT INTO sensors (group_id, codename, sensor_index, x, y, z, data_rate)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {SENSOR_COLUMNS}
            "#
        );
        let stored = sqlx::query_as::<_, Sensor>(&sql)
            .bind(sensor.group_id)
            .bind(&sensor.codename)
            .bind(sensor.index)
            .bind(sensor.position.x)
            .bind(sensor.position.y)
            .bind(sensor.position.z)
            .bind(sensor.data_rate)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| unique_conflict(e, || format!("sensor '{}'", sensor.codename)))?;
        Ok(stored)
    }

    async fn list_sensors(&self) -> StoreResult<Vec<Sensor>> {
        // ---
        let sql = format!("SELECT {SENSOR_COLUMNS} FROM sensors ORDER BY id");
        let sensors = sqlx::query_as::<_, Sensor>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(sensors)
    }

    async fn insert_reading(&self, reading: &NewReading) -> StoreResult<bool> {
        // ---
        let result = sqlx::query(
            r#"
            INSERT INTO sensor_data (
                reading_key, sensor_id, temperature, transparency,
                fish_species_name, fish_species_count, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (reading_key) DO NOTHING
            "#,
        )
        .bind(reading.reading_key)
        .bind(reading.sensor_id)
        .bind(reading.temperature)
        .bind(reading.transparency)
        .bind(&reading.fish_species_name)
        .bind(reading.fish_species_count)
        .bind(reading.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn group_transparency_mean(&self, group: &str) -> StoreResult<Option<f64>> {
        // ---
        let sql = format!("SELECT AVG(sd.transparency)::DOUBLE PRECISION {GROUP_READINGS}");
        let mean = sqlx::query_scalar::<_, Option<f64>>(&sql)
            .bind(group)
            .fetch_one(&self.pool)
            .await?;
        Ok(mean)
    }

    async fn group_temperature_mean(&self, group: &str) -> StoreResult<Option<f64>> {
        // ---
        let sql = format!("SELECT AVG(sd.temperature) {GROUP_READINGS}");
        let mean = sqlx::query_scalar::<_, Option<f64>>(&sql)
            .bind(group)
            .fetch_one(&self.pool)
            .await?;
        Ok(mean)
    }

    async fn group_species_counts(
        &self,
        group: &str,
        window: &TimeWindow,
        limit: Option<usize>,
    ) -> StoreResult<Vec<SpeciesCount>> {
        // ---
        // A NULL limit means no limit in PostgreSQL
        let sql = format!(
            r#"
            SELECT sd.fish_species_name AS species, COUNT(*) AS count
            {GROUP_READINGS}
              AND ($2::TIMESTAMPTZ IS NULL OR sd.created_at >= $2)
              AND ($3::TIMESTAMPTZ IS NULL OR sd.created_at <= $3)
            GROUP BY sd.fish_species_name
            ORDER BY count DESC, species ASC
            LIMIT $4
            "#
        );
        let counts = sqlx::query_as::<_, SpeciesCount>(&sql)
            .bind(group)
            .bind(window.from)
            .bind(window.till)
            .bind(limit.map(|n| i64::try_from(n).unwrap_or(i64::MAX)))
            .fetch_all(&self.pool)
            .await?;
        Ok(counts)
    }

    async fn region_temperature_min(&self, region: &Region) -> StoreResult<Option<f64>> {
        self.region_extreme("MIN", region).await
    }

    async fn region_temperature_max(&self, region: &Region) -> StoreResult<Option<f64>> {
        self.region_extreme("MAX", region).await
    }

    async fn sensor_temperature_mean(
        &self,
        codename: &str,
        from: DateTime<Utc>,
        till: DateTime<Utc>,
    ) -> StoreResult<Option<f64>> {
        // ---
        let mean = sqlx::query_scalar::<_, Option<f64>>(
            r#"
            SELECT AVG(sd.temperature)
            FROM sensor_data sd
            JOIN sensors s ON s.id = sd.sensor_id
            WHERE s.codename = $1
              AND sd.created_at BETWEEN $2 AND $3
            "#,
        )
        .bind(codename)
        .bind(from)
        .bind(till)
        .fetch_one(&self.pool)
        .await?;
        Ok(mean)
    }

    async fn record_rollup(&self, at: DateTime<Utc>) -> StoreResult<Vec<AggregateSnapshot>> {
        // ---
        let snapshots = sqlx::query_as::<_, AggregateSnapshot>(
            r#"
            INSERT INTO aggregated_statistics (
                group_id, average_temperature, average_transparency, created_at
            )
            SELECT
                s.group_id,
                AVG(sd.temperature),
                AVG(sd.transparency)::DOUBLE PRECISION,
                $1
            FROM sensors s
            JOIN sensor_data sd ON sd.sensor_id = s.id
            GROUP BY s.group_id
            RETURNING
                id,
                group_id,
                average_temperature AS avg_temperature,
                average_transparency AS avg_transparency,
                created_at
            "#,
        )
        .bind(at)
        .fetch_all(&self.pool)
        .await?;
        Ok(snapshots)
    }
}
