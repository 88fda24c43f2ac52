use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::{parse_coordinate, ApiError};
use super::AppState;
use crate::models::Region;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/region/temperature/min", get(min_temperature))
        .route("/region/temperature/max", get(max_temperature))
}

#[derive(Debug, Serialize)]
pub struct MinTemperature {
    #[serde(rename = "Min Temperature")]
    min_temperature: f64,
}

#[derive(Debug, Serialize)]
pub struct MaxTemperature {
    #[serde(rename = "Max Temperature")]
    max_temperature: f64,
}

/// Closed box bounds. Kept as strings so bad input gets a precise message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionQuery {
    x_min: Option<String>,
    x_max: Option<String>,
    y_min: Option<String>,
    y_max: Option<String>,
    z_min: Option<String>,
    z_max: Option<String>,
}

impl RegionQuery {
    fn to_region(&self) -> Result<Region, ApiError> {
        // ---
        let region = Region::new(
            parse_coordinate("xMin", self.x_min.as_deref())?,
            parse_coordinate("xMax", self.x_max.as_deref())?,
            parse_coordinate("yMin", self.y_min.as_deref())?,
            parse_coordinate("yMax", self.y_max.as_deref())?,
            parse_coordinate("zMin", self.z_min.as_deref())?,
            parse_coordinate("zMax", self.z_max.as_deref())?,
        )?;
        Ok(region)
    }
}

async fn min_temperature(
    Query(params): Query<RegionQuery>,
    State(engine): State<AppState>,
) -> Result<Json<MinTemperature>, ApiError> {
    // ---
    info!("GET /region/temperature/min {:?}", params);
    let region = params.to_region()?;
    let min_temperature = engine.region_min_temperature(&region).await?;
    Ok(Json(MinTemperature { min_temperature }))
}

async fn max_temperature(
    Query(params): Query<RegionQuery>,
    State(engine): State<AppState>,
) -> Result<Json<MaxTemperature>, ApiError> {
    // ---
    info!("GET /region/temperature/max {:?}", params);
    let region = params.to_region()?;
    let max_temperature = engine.region_max_temperature(&region).await?;
    Ok(Json(MaxTemperature { max_temperature }))
}
