use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::{parse_epoch, ApiError};
use super::AppState;
use crate::models::{SpeciesCount, TimeWindow};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/group/{group}/transparency/average", get(transparency_average))
        .route("/group/{group}/temperature/average", get(temperature_average))
        .route("/group/{group}/species", get(species))
        .route("/group/{group}/species/top/{n}", get(top_species))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransparencyAverage {
    group: String,
    average_transparency: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureAverage {
    group: String,
    average_temperature: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeciesList {
    group: String,
    species_list: BTreeMap<String, i64>,
}

/// Top-N species in rank order.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedSpecies {
    group: String,
    species_list: Vec<SpeciesCount>,
}

/// Optional window, unix seconds, both ends inclusive.
#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    from: Option<String>,
    till: Option<String>,
}

async fn transparency_average(
    Path(group): Path<String>,
    State(engine): State<AppState>,
) -> Result<Json<TransparencyAverage>, ApiError> {
    // ---
    info!("GET /group/{}/transparency/average", group);
    let average_transparency = engine.group_transparency_average(&group).await?;
    Ok(Json(TransparencyAverage {
        group,
        average_transparency,
    }))
}

async fn temperature_average(
    Path(group): Path<String>,
    State(engine): State<AppState>,
) -> Result<Json<TemperatureAverage>, ApiError> {
    // ---
    info!("GET /group/{}/temperature/average", group);
    let average_temperature = engine.group_temperature_average(&group).await?;
    Ok(Json(TemperatureAverage {
        group,
        average_temperature,
    }))
}

async fn species(
    Path(group): Path<String>,
    State(engine): State<AppState>,
) -> Result<Json<SpeciesList>, ApiError> {
    // ---
    info!("GET /group/{}/species", group);
    let species_list = engine.group_species(&group).await?;
    Ok(Json(SpeciesList {
        group,
        species_list,
    }))
}

async fn top_species(
    Path((group, n)): Path<(String, String)>,
    Query(params): Query<WindowQuery>,
    State(engine): State<AppState>,
) -> Result<Json<RankedSpecies>, ApiError> {
    // ---
    info!("GET /group/{}/species/top/{} {:?}", group, n, params);

    let n = n
        .parse::<usize>()
        .map_err(|_| ApiError::invalid(format!("Invalid n value: {n}")))?;
    let window = TimeWindow::new(
        parse_epoch("from", params.from.as_deref())?,
        parse_epoch("till", params.till.as_deref())?,
    )?;

    let species_list = engine.top_group_species(&group, n, &window).await?;
    Ok(Json(RankedSpecies {
        group,
        species_list,
    }))
}
