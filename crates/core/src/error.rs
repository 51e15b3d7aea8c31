//! Domain error type shared by every crate in the workspace.

/// Domain-level error.
///
/// `NotFound` and `DataAbsent` are expected conditions: the former maps to a
/// 404-class response and is never logged as an error, the latter is
/// recovered locally (a search mode without an embedding is dropped from
/// fusion rather than failing the query).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// A target lacks the derived data (embedding, metadata) a query needs.
    #[error("Data absent: {0}")]
    DataAbsent(String),

    /// A numeric routine collapsed (e.g. DTW on a degenerate series).
    #[error("Compute failed: {0}")]
    Compute(String),

    /// The surrounding request was cancelled between suspension points.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a `NotFound` on a Bahn id.
    pub fn bahn_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "Bahn",
            id: id.into(),
        }
    }

    /// Shorthand for a `NotFound` on a segment id.
    pub fn segment_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "Segment",
            id: id.into(),
        }
    }
}
