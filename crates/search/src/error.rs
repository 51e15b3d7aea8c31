use bahn_core::CoreError;
use thiserror::Error;

/// Error type for the search orchestration layer.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl SearchError {
    /// True for the not-found family, which callers surface as a 404.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SearchError::Core(CoreError::NotFound { .. })
                | SearchError::Db(sqlx::Error::RowNotFound)
        )
    }
}
