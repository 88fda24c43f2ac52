use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::{parse_epoch, ApiError};
use super::AppState;
use crate::models::TimeWindow;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/sensor/{codename}/temperature/average", get(temperature_average))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorTemperatureAverage {
    code_name: String,
    average_temperature: f64,
}

/// Window in unix seconds. Both ends are required for this route.
#[derive(Debug, Deserialize)]
pub struct RequiredWindowQuery {
    from: Option<String>,
    till: Option<String>,
}

async fn temperature_average(
    Path(codename): Path<String>,
    Query(params): Query<RequiredWindowQuery>,
    State(engine): State<AppState>,
) -> Result<Json<SensorTemperatureAverage>, ApiError> {
    // ---
    info!("GET /sensor/{}/temperature/average {:?}", codename, params);

    let from = parse_epoch("from", params.from.as_deref())?
        .ok_or_else(|| ApiError::invalid("Missing 'from' parameter"))?;
    let till = parse_epoch("till", params.till.as_deref())?
        .ok_or_else(|| ApiError::invalid("Missing 'till' parameter"))?;
    TimeWindow::new(Some(from), Some(till))?;

    let average_temperature = engine
        .sensor_temperature_average(&codename, from, till)
        .await?;
    Ok(Json(SensorTemperatureAverage {
        code_name: codename,
        average_temperature,
    }))
}
