use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use bahn_pipeline::TaskRegistry;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`. Cheaply cloneable.
#[derive(Clone)]
pub struct AppState {
    pub pool: bahn_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// In-process registry for long-running ingest jobs.
    pub tasks: Arc<TaskRegistry>,
    /// Cancelled on shutdown; background jobs and DTW batches observe it.
    pub shutdown: CancellationToken,
}
