use bahn_core::CoreError;
use thiserror::Error;

/// Error type for the ingestion pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}
