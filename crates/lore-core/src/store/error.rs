use thiserror::Error;

/// Errors surfaced by a graph store adapter.
///
/// Query failures are never skipped by the pipeline: graph context feeds
/// prompt quality, so they are retried and then reported.
#[derive(Debug, Error)]
pub enum GraphStoreError {
    #[error("Graph query failed: {0}")]
    Query(String),

    #[error("Graph store unavailable: {0}")]
    Unavailable(String),

    #[error("Write rejected: {0}")]
    Write(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GraphStoreError {
    pub fn query(message: impl Into<String>) -> Self {
        GraphStoreError::Query(message.into())
    }
}
