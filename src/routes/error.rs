//! Mapping of query errors onto HTTP responses.
//!
//! All failures are client-error statuses with a JSON body
//! `{"error": "<message>"}`:
//! - `InvalidArgument` → 400
//! - `NotFound` → 404
//! - `Transient` → 424, the request depended on a store or cache that failed

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;

use crate::error::QueryError;

// ---

#[derive(Debug)]
pub struct ApiError(pub QueryError);

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self(QueryError::InvalidArgument(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        // ---
        match self.0 {
            QueryError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            QueryError::NotFound { .. } => StatusCode::NOT_FOUND,
            QueryError::Transient(_) => StatusCode::FAILED_DEPENDENCY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        let status = self.status();
        match &self.0 {
            QueryError::Transient(e) => tracing::error!("Query failed: {}", e),
            other => tracing::debug!("Query rejected: {}", other),
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Parse an optional unix-seconds query parameter. Blank counts as absent.
pub fn parse_epoch(name: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>, ApiError> {
    // ---
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    let secs = raw
        .parse::<i64>()
        .map_err(|_| ApiError::invalid(format!("Invalid '{name}' parameter: {raw}")))?;
    DateTime::from_timestamp(secs, 0)
        .map(Some)
        .ok_or_else(|| ApiError::invalid(format!("'{name}' is out of range: {raw}")))
}

/// Parse a required floating point query parameter.
pub fn parse_coordinate(name: &str, raw: Option<&str>) -> Result<f64, ApiError> {
    // ---
    let raw = raw
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::invalid(format!("Missing {name} parameter")))?;
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ApiError::invalid(format!("Invalid {name} parameter: {raw}")))
}
