use axum::Router;

use crate::state::AppState;

pub mod bahn;
pub mod health;
pub mod ingest;
pub mod similarity;
pub mod tasks;

/// All API routes below the root.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/bahn", bahn::router())
        .nest("/ingest", ingest::router())
        .nest("/similarity", similarity::router())
        .nest("/tasks", tasks::router())
}
