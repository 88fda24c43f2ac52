//! Application entry point for the `codemetal-sensorhub` service.
//!
//! This binary orchestrates the full startup sequence:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Establishing a PostgreSQL connection pool and creating the schema
//! - Connecting the aggregate cache (Redis, or in-process when unset)
//! - Seeding sensor groups and sensors on first start
//! - Spawning the supervised generator and rollup jobs
//! - Serving the query API until Ctrl-C, then stopping the jobs
//!
//! # Environment Variables
//! - `DATABASE_URL` (**required**) – PostgreSQL connection string
//! - `REDIS_URL` (optional) – aggregate cache endpoint
//! - `AXUM_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AXUM_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! See `config.rs` for the remaining tuning knobs.
use std::{env, sync::Arc};

use anyhow::Result;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use sensorhub::supervisor::{run_job, shutdown_channel, stop_on_first, wait_for_shutdown};
use sensorhub::{
    config, routes, schema, seed, AggregateCache, Generator, MemoryCache, PgReadingsStore,
    QueryEngine, ReadingsStore, RedisCache, RollupJob,
};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(&cfg.db_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    tracing::info!("Successfully connected to database");

    schema::create_schema(&pool).await?;

    let store: Arc<dyn ReadingsStore> = Arc::new(PgReadingsStore::new(pool.clone()));
    let cache: Arc<dyn AggregateCache> = match &cfg.redis_url {
        Some(url) => {
            let cache = RedisCache::connect(url)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to cache: {}", e))?;
            tracing::info!("Successfully connected to cache");
            Arc::new(cache)
        }
        None => {
            tracing::warn!("REDIS_URL not set, using in-process aggregate cache");
            Arc::new(MemoryCache::new())
        }
    };

    let mut seed_rng = match cfg.generator_seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
        None => StdRng::from_entropy(),
    };
    let created = seed::seed_sensors(
        store.as_ref(),
        &cfg.seed_groups,
        cfg.sensors_per_group,
        &mut seed_rng,
    )
    .await?;
    tracing::info!("Bootstrap created {} sensors", created.len());

    // Background jobs, each supervised on its own task
    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    let generator = Generator::new(store.clone(), cache.clone(), cfg.generator_seed)
        .with_insert_retries(cfg.insert_retries, cfg.backoff_initial);
    let generator_task = {
        let (pacing, backoff) = (cfg.generator_pacing(), cfg.backoff());
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { run_job(&generator, pacing, backoff, shutdown).await })
    };

    let rollup = RollupJob::new(store.clone());
    let rollup_task = {
        let (pacing, backoff) = (cfg.rollup_pacing(), cfg.backoff());
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { run_job(&rollup, pacing, backoff, shutdown).await })
    };

    let engine = Arc::new(QueryEngine::new(store, cache).with_cache_ttl(cfg.cache_ttl));
    let app = routes::router(engine);

    tracing::info!("Listening on {}", cfg.bind_addr);

    let listener = tokio::net::TcpListener::bind(cfg.bind_addr).await?;
    let mut server_shutdown = shutdown_rx.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { wait_for_shutdown(&mut server_shutdown).await });
    let mut server_task = tokio::spawn(async move { server.await });

    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl-C, shutting down"),
            Err(e) => tracing::error!("Failed to listen for Ctrl-C, shutting down: {}", e),
        }
    };
    let server = match stop_on_first(ctrl_c, &mut server_task, &shutdown_tx).await {
        Some(ended) => ended,
        None => server_task.await,
    };

    let (generated, rolled_up) = tokio::join!(generator_task, rollup_task);
    tracing::info!(
        "Stopped after {} generator and {} rollup cycles",
        generated?,
        rolled_up?
    );
    server??;

    pool.close().await;
    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `AXUM_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by the `AXUM_LOG_LEVEL` env var
///
/// This should be called once at application startup before any logging
/// or tracing macros are invoked. It installs the subscriber globally
/// for the lifetime of the process.
fn init_tracing() {
    // ---
    let span_events = match env::var("AXUM_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to AXUM_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("AXUM_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
