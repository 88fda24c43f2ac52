//! Configuration loader for the `codemetal-sensorhub` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
use std::{env, net::SocketAddr, time::Duration};

use anyhow::{anyhow, Result};

use crate::cache::{is_key_segment, KEY_SEPARATOR};
use crate::supervisor::{Backoff, Pacing};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env {
    ($var_name:expr, $ty:ty, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Redis endpoint for the aggregate cache. `None` selects the in-process cache.
    pub redis_url: Option<String>,

    /// HTTP listen address.
    pub bind_addr: SocketAddr,

    /// Lifetime of memoized aggregates.
    pub cache_ttl: Duration,

    pub generator_period: Duration,
    pub rollup_period: Duration,

    /// Fixed RNG seed for reproducible generation runs.
    pub generator_seed: Option<u64>,

    /// Groups created at bootstrap, in order.
    pub seed_groups: Vec<String>,
    pub sensors_per_group: u32,

    pub backoff_initial: Duration,
    pub backoff_max: Duration,

    /// Attempts per reading insert before a generation cycle fails.
    pub insert_retries: u32,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `REDIS_URL` – aggregate cache endpoint (default: in-process cache)
/// - `BIND_ADDR` – listen address (default: 0.0.0.0:8080)
/// - `CACHE_TTL_SECS` – aggregate memo lifetime (default: 10)
/// - `GENERATOR_PERIOD_MS` / `ROLLUP_PERIOD_MS` – job ticks, 0 = free-running
///   (defaults: 1000 / 5000)
/// - `GENERATOR_SEED` – fixed RNG seed (default: from entropy)
/// - `SEED_GROUPS` – comma separated group names (default: alpha,beta,gamma)
/// - `SENSORS_PER_GROUP` – sensors created per group (default: 3)
/// - `BACKOFF_INITIAL_MS` / `BACKOFF_MAX_MS` – job retry bounds (defaults: 250 / 30000)
/// - `INSERT_RETRIES` – attempts per reading insert (default: 3)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let db_pool_max = parse_env!("DB_POOL_MAX", u32, 5);
    let redis_url = env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty());
    let bind_addr = parse_env!("BIND_ADDR", SocketAddr, SocketAddr::from(([0, 0, 0, 0], 8080)));
    let cache_ttl = Duration::from_secs(parse_env!("CACHE_TTL_SECS", u64, 10));
    let generator_period = Duration::from_millis(parse_env!("GENERATOR_PERIOD_MS", u64, 1000));
    let rollup_period = Duration::from_millis(parse_env!("ROLLUP_PERIOD_MS", u64, 5000));
    let generator_seed = env::var("GENERATOR_SEED")
        .ok()
        .map(|v| v.parse::<u64>())
        .transpose()
        .map_err(|e| anyhow!("Invalid GENERATOR_SEED: {}", e))?;
    let seed_groups = parse_group_list(
        &env::var("SEED_GROUPS").unwrap_or_else(|_| "alpha,beta,gamma".to_string()),
    )?;
    let sensors_per_group = parse_env!("SENSORS_PER_GROUP", u32, 3);
    let backoff_initial = Duration::from_millis(parse_env!("BACKOFF_INITIAL_MS", u64, 250));
    let backoff_max = Duration::from_millis(parse_env!("BACKOFF_MAX_MS", u64, 30_000));
    let insert_retries = parse_env!("INSERT_RETRIES", u32, 3).max(1);

    if cache_ttl.is_zero() {
        return Err(anyhow!("CACHE_TTL_SECS must be at least 1"));
    }
    if backoff_initial > backoff_max {
        return Err(anyhow!("BACKOFF_INITIAL_MS must not exceed BACKOFF_MAX_MS"));
    }

    Ok(Config {
        db_url,
        db_pool_max,
        redis_url,
        bind_addr,
        cache_ttl,
        generator_period,
        rollup_period,
        generator_seed,
        seed_groups,
        sensors_per_group,
        backoff_initial,
        backoff_max,
        insert_retries,
    })
}

/// Split a comma separated list of group names, rejecting blanks and repeats.
fn parse_group_list(raw: &str) -> Result<Vec<String>> {
    // ---
    let mut groups: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim) {
        if name.is_empty() {
            return Err(anyhow!("SEED_GROUPS contains an empty group name"));
        }
        if !is_key_segment(name) {
            return Err(anyhow!(
                "SEED_GROUPS name '{}' must not contain '{}'",
                name,
                KEY_SEPARATOR
            ));
        }
        if groups.iter().any(|g| g == name) {
            return Err(anyhow!("SEED_GROUPS lists '{}' more than once", name));
        }
        groups.push(name.to_string());
    }
    Ok(groups)
}

/// Replace the password component of a connection URL with `****`.
fn mask_password(url: &str) -> String {
    // ---
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            // `postgres://host@...` has no password, only the scheme colon
            if url[colon_pos..].starts_with("://") {
                return url.to_string();
            }
            return format!("{}:****{}", &url[..colon_pos], &url[at_pos..]);
        }
    }
    url.to_string()
}

impl Config {
    /// Pacing for the generator job.
    pub fn generator_pacing(&self) -> Pacing {
        Pacing::from_period(self.generator_period)
    }

    /// Pacing for the rollup job.
    pub fn rollup_pacing(&self) -> Pacing {
        Pacing::from_period(self.rollup_period)
    }

    /// A fresh backoff policy for one supervised job.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.backoff_initial, self.backoff_max)
    }

    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks passwords in connection URLs while showing all configuration
    /// values that were loaded.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL        : {}", mask_password(&self.db_url));
        tracing::info!("  DB_POOL_MAX         : {}", self.db_pool_max);
        match &self.redis_url {
            Some(url) => tracing::info!("  REDIS_URL           : {}", mask_password(url)),
            None => tracing::info!("  REDIS_URL           : <unset, in-process cache>"),
        }
        tracing::info!("  BIND_ADDR           : {}", self.bind_addr);
        tracing::info!("  CACHE_TTL_SECS      : {}", self.cache_ttl.as_secs());
        tracing::info!("  GENERATOR_PERIOD_MS : {}", self.generator_period.as_millis());
        tracing::info!("  ROLLUP_PERIOD_MS    : {}", self.rollup_period.as_millis());
        tracing::info!("  GENERATOR_SEED      : {:?}", self.generator_seed);
        tracing::info!("  SEED_GROUPS         : {}", self.seed_groups.join(","));
        tracing::info!("  SENSORS_PER_GROUP   : {}", self.sensors_per_group);
        tracing::info!(
            "  BACKOFF_MS          : {}..{}",
            self.backoff_initial.as_millis(),
            self.backoff_max.as_millis()
        );
        tracing::info!("  INSERT_RETRIES      : {}", self.insert_retries);
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_mask_password() {
        // ---
        assert_eq!(
            mask_password("postgres://user:secret@db:5432/sensors"),
            "postgres://user:****@db:5432/sensors"
        );
        assert_eq!(
            mask_password("redis://:hunter2@cache:6379"),
            "redis://:****@cache:6379"
        );
        // Nothing to mask
        assert_eq!(mask_password("redis://cache:6379"), "redis://cache:6379");
        assert_eq!(
            mask_password("postgres://user@db/sensors"),
            "postgres://user@db/sensors"
        );
    }

    #[test]
    fn test_group_list() {
        // ---
        assert_eq!(
            parse_group_list("alpha, beta ,gamma").unwrap(),
            vec!["alpha", "beta", "gamma"]
        );
        assert!(parse_group_list("alpha,,beta").is_err());
        assert!(parse_group_list("alpha,alpha").is_err());
        assert!(parse_group_list("alpha,depth:1.00").is_err());
    }
}
