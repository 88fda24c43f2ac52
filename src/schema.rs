//! Database schema management for `codemetal-sensorhub`.
//!
//! Ensures required tables and indexes exist before the jobs start or any
//! request is served. Applied once on startup from `main.rs`.

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates `sensor_groups` and `sensors` (bootstrap metadata), the
/// append-only `sensor_data` readings table and the `aggregated_statistics`
/// rollup table. Safe to call on every startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor_groups (
            id    SERIAL PRIMARY KEY,
            name  TEXT NOT NULL UNIQUE
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensors (
            id            SERIAL PRIMARY KEY,
            group_id      INTEGER          NOT NULL REFERENCES sensor_groups (id),
            codename      TEXT             NOT NULL UNIQUE,
            sensor_index  INTEGER          NOT NULL,
            x             DOUBLE PRECISION NOT NULL,
            y             DOUBLE PRECISION NOT NULL,
            z             DOUBLE PRECISION NOT NULL,
            data_rate     INTEGER          NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Readings are append-only; reading_key makes retried inserts idempotent
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor_data (
            id                  BIGSERIAL PRIMARY KEY,
            reading_key         UUID             NOT NULL UNIQUE,
            sensor_id           INTEGER          NOT NULL REFERENCES sensors (id),
            temperature         DOUBLE PRECISION NOT NULL,
            transparency        INTEGER          NOT NULL CHECK (transparency BETWEEN 0 AND 100),
            fish_species_name   TEXT             NOT NULL,
            fish_species_count  INTEGER          NOT NULL,
            created_at          TIMESTAMPTZ      NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS aggregated_statistics (
            id                    BIGSERIAL PRIMARY KEY,
            group_id              INTEGER          NOT NULL REFERENCES sensor_groups (id),
            average_temperature   DOUBLE PRECISION NOT NULL,
            average_transparency  DOUBLE PRECISION NOT NULL,
            created_at            TIMESTAMPTZ      NOT NULL DEFAULT NOW()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Per-sensor windowed averages and group joins
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_sensor_data_sensor_created
            ON sensor_data (sensor_id, created_at);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_sensors_group_id
            ON sensors (group_id);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
