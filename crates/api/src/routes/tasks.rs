//! Task status polling for long-running ingest jobs.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use bahn_core::CoreError;
use bahn_pipeline::TaskRecord;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// GET /tasks/{task_id}
async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<TaskRecord>> {
    state
        .tasks
        .snapshot(task_id)
        .map(Json)
        .ok_or_else(|| AppError::Core(CoreError::NotFound {
            entity: "task",
            id: task_id.to_string(),
        }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/{task_id}", get(get_task))
}
