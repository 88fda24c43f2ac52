//! Sensor telemetry service: simulated environmental sensors, a readings
//! store, a read-through aggregate cache and the analytical queries over them.
//!
//! Three long-lived activities share the store:
//! - the [`Generator`] appends one reading per sensor per cycle,
//! - the [`RollupJob`] appends per-group average snapshots,
//! - the [`QueryEngine`] answers requests, memoizing hot averages.
//!
//! No in-process lock coordinates them; every store and cache call is an
//! independent statement and queries see whatever has been committed.

pub mod cache;
pub mod config;
pub mod error;
pub mod generator;
pub mod models;
pub mod query;
pub mod rollup;
pub mod routes;
pub mod schema;
pub mod seed;
pub mod store;
pub mod supervisor;

pub use cache::{AggregateCache, MemoryCache, RedisCache};
pub use config::Config;
pub use error::{QueryError, StoreError};
pub use generator::Generator;
pub use query::QueryEngine;
pub use rollup::RollupJob;
pub use store::{MemoryReadingsStore, PgReadingsStore, ReadingsStore};
