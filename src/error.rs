//! Error taxonomy shared by the store, cache and query layers.

// ---

/// A dependency (database or cache) failed.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique name (group name, sensor codename) is already taken.
    /// Not retryable.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the query engine to its callers.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// No rows where data is expected to exist.
    #[error("no data found for {what}")]
    NotFound { what: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("dependency unavailable: {0}")]
    Transient(#[from] StoreError),
}

impl QueryError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }
}

/// A cached value that does not parse as the expected scalar.
///
/// Never returned to query callers; the read-through policy logs it and
/// treats the entry as a miss.
#[derive(Debug, thiserror::Error)]
#[error("malformed cache value {value:?} under key {key:?}")]
pub struct CacheValueError {
    pub key: String,
    pub value: String,
}
