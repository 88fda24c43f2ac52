//! Rollup job: appends a per-group average snapshot every cycle.
//!
//! Write-only. It neither reads nor populates the aggregate cache, and
//! nothing in the query path reads the snapshots it writes.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::store::ReadingsStore;
use crate::supervisor::Job;

// ---

pub struct RollupJob {
    store: Arc<dyn ReadingsStore>,
}

impl RollupJob {
    pub fn new(store: Arc<dyn ReadingsStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Job for RollupJob {
    fn name(&self) -> &'static str {
        "rollup"
    }

    async fn run_cycle(&self) -> Result<usize> {
        // ---
        let snapshots = self
            .store
            .record_rollup(Utc::now())
            .await
            .context("recording group rollup")?;

        for snapshot in &snapshots {
            tracing::trace!(
                group_id = snapshot.group_id,
                avg_temperature = snapshot.avg_temperature,
                avg_transparency = snapshot.avg_transparency,
                "Snapshot recorded"
            );
        }
        Ok(snapshots.len())
    }
}
