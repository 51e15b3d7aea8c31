//! CSV ingestion endpoint.
//!
//! Small batches run inline and return the full report. Larger batches
//! are handed to the task registry and return a task id the client polls
//! via `GET /tasks/{task_id}`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bahn_pipeline::{IngestFile, IngestParams, Ingestor, StartOutcome};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Batches larger than this run asynchronously behind a task id.
const ASYNC_THRESHOLD: usize = 3;

#[derive(Debug, Deserialize)]
struct IngestRequest {
    files: Vec<IngestFile>,
    #[serde(flatten)]
    params: IngestParams,
}

#[derive(Debug, Serialize)]
struct TaskStartedResponse {
    task_id: Uuid,
    /// True when an identical batch was already running and its id was
    /// returned instead of starting a new one.
    already_running: bool,
}

/// POST /ingest/csv
async fn ingest_csv(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> AppResult<impl IntoResponse> {
    if request.files.is_empty() {
        return Err(AppError::BadRequest("no files in ingest request".into()));
    }
    request.params.segmentation.validate().map_err(AppError::Core)?;

    if request.files.len() <= ASYNC_THRESHOLD {
        let report = Ingestor::ingest(&state.pool, &request.files, &request.params).await?;
        return Ok((StatusCode::OK, Json(serde_json::to_value(report).unwrap_or_default())));
    }

    // Deduplication key: the sorted file names plus segmentation params.
    let mut names: Vec<&str> = request.files.iter().map(|f| f.filename.as_str()).collect();
    names.sort_unstable();
    let key = format!(
        "{}|{}",
        names.join(","),
        serde_json::to_string(&request.params.segmentation).unwrap_or_default()
    );

    let outcome = state.tasks.start("ingest", &key, request.files.len() as u64);
    let task_id = outcome.task_id();
    let already_running = matches!(outcome, StartOutcome::AlreadyRunning(_));

    if !already_running {
        let pool = state.pool.clone();
        let tasks = state.tasks.clone();
        let files = request.files;
        let params = request.params;
        tokio::spawn(async move {
            let mut outcomes = Vec::with_capacity(files.len());
            // One file per call so the registry sees per-file progress.
            for file in &files {
                match Ingestor::ingest(&pool, std::slice::from_ref(file), &params).await {
                    Ok(mut report) => {
                        let failed = report
                            .outcomes
                            .iter()
                            .filter(|o| matches!(o, bahn_pipeline::FileOutcome::Failed { .. }))
                            .count() as u64;
                        tasks.advance(task_id, 1 - failed.min(1), failed.min(1));
                        outcomes.append(&mut report.outcomes);
                    }
                    Err(err) => {
                        tracing::error!(error = %err, file = %file.filename, "ingest task file failed");
                        tasks.advance(task_id, 0, 1);
                    }
                }
            }
            let summary = serde_json::json!({ "outcomes": outcomes });
            tasks.complete(task_id, summary);
        });
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(
            serde_json::to_value(TaskStartedResponse {
                task_id,
                already_running,
            })
            .unwrap_or_default(),
        ),
    ))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/csv", post(ingest_csv))
}
