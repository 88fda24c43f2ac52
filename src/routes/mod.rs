use std::sync::Arc;

use axum::Router;

use crate::QueryEngine;

mod error;
mod groups;
mod health;
mod region;
mod sensors;

pub use error::ApiError;

// ---

/// Shared state handed to every handler.
pub type AppState = Arc<QueryEngine>;

pub fn router(engine: Arc<QueryEngine>) -> Router {
    // ---
    Router::new()
        .merge(groups::router())
        .merge(region::router())
        .merge(sensors::router())
        .merge(health::router())
        .with_state(engine)
}
