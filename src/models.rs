//! Data models for the sensor telemetry service.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::QueryError;

// ---

/// A deployment site. Immutable after bootstrap; `name` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct SensorGroup {
    // ---
    pub id: i32,
    pub name: String,
}

/// Sensor location. `z` is depth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, sqlx::FromRow)]
pub struct Position {
    // ---
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A sensor as stored. `codename` is unique across all groups.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Sensor {
    // ---
    pub id: i32,
    pub group_id: i32,
    pub codename: String,
    #[sqlx(rename = "sensor_index")]
    pub index: i32,
    #[sqlx(flatten)]
    pub position: Position,
    pub data_rate: i32,
}

/// Sensor definition before it has been assigned an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSensor {
    // ---
    pub group_id: i32,
    pub codename: String,
    pub index: i32,
    pub position: Position,
    pub data_rate: i32,
}

/// One generated observation, ready to be appended.
///
/// `reading_key` makes the insert idempotent: re-submitting the same value
/// after a failed attempt can never produce a second row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    // ---
    pub reading_key: Uuid,
    pub sensor_id: i32,
    pub temperature: f64,
    pub transparency: i32,
    pub fish_species_name: String,
    pub fish_species_count: i32,
    pub created_at: DateTime<Utc>,
}

/// A persisted reading. Append-only.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    // ---
    pub id: i64,
    pub reading_key: Uuid,
    pub sensor_id: i32,
    pub temperature: f64,
    pub transparency: i32,
    pub fish_species_name: String,
    pub fish_species_count: i32,
    pub created_at: DateTime<Utc>,
}

/// Group-level rollup written by the rollup job.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct AggregateSnapshot {
    // ---
    pub id: i64,
    pub group_id: i32,
    pub avg_temperature: f64,
    pub avg_transparency: f64,
    pub created_at: DateTime<Utc>,
}

/// Number of readings that reported a given species.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct SpeciesCount {
    // ---
    pub species: String,
    pub count: i64,
}

/// Closed time interval `[from, till]`; either end may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    // ---
    pub from: Option<DateTime<Utc>>,
    pub till: Option<DateTime<Utc>>,
}

impl TimeWindow {
    // ---
    pub fn new(
        from: Option<DateTime<Utc>>,
        till: Option<DateTime<Utc>>,
    ) -> Result<Self, QueryError> {
        // ---
        if let (Some(from), Some(till)) = (from, till) {
            if from > till {
                return Err(QueryError::InvalidArgument(format!(
                    "window start {from} is after window end {till}"
                )));
            }
        }
        Ok(Self { from, till })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| at >= from) && self.till.map_or(true, |till| at <= till)
    }
}

/// Closed axis-aligned box in sensor coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    // ---
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub z_min: f64,
    pub z_max: f64,
}

impl Region {
    // ---
    pub fn new(
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
        z_min: f64,
        z_max: f64,
    ) -> Result<Self, QueryError> {
        // ---
        for (axis, lo, hi) in [("x", x_min, x_max), ("y", y_min, y_max), ("z", z_min, z_max)] {
            if lo.is_nan() || hi.is_nan() {
                return Err(QueryError::InvalidArgument(format!("{axis} bound is NaN")));
            }
            if lo > hi {
                return Err(QueryError::InvalidArgument(format!(
                    "{axis}Min {lo} is greater than {axis}Max {hi}"
                )));
            }
        }
        Ok(Self {
            x_min,
            x_max,
            y_min,
            y_max,
            z_min,
            z_max,
        })
    }

    pub fn contains(&self, p: &Position) -> bool {
        // ---
        (self.x_min..=self.x_max).contains(&p.x)
            && (self.y_min..=self.y_max).contains(&p.y)
            && (self.z_min..=self.z_max).contains(&p.z)
    }
}

/// Round half away from zero to `precision` decimal places.
pub fn round_to_precision(value: f64, precision: i32) -> f64 {
    // ---
    let shift = 10f64.powi(precision);
    (value * shift).round() / shift
}
