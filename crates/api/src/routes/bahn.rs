//! Inspection and deletion of stored Bahnen.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use bahn_core::metadata::SegmentMetadata;
use bahn_core::CoreError;
use bahn_db::models::bahn::BahnInfo;
use bahn_db::models::embedding::EmbeddingPresence;
use bahn_db::repositories::{BahnRepo, EmbeddingRepo, MetaRepo};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// GET /bahn/{bahn_id}
async fn get_bahn(
    State(state): State<AppState>,
    Path(bahn_id): Path<String>,
) -> AppResult<Json<BahnInfo>> {
    BahnRepo::fetch_bahn_info(&state.pool, &bahn_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::Core(CoreError::bahn_not_found(&bahn_id)))
}

/// GET /bahn/{bahn_id}/meta
///
/// All derived metadata records of one Bahn, the aggregate row included.
async fn get_bahn_meta(
    State(state): State<AppState>,
    Path(bahn_id): Path<String>,
) -> AppResult<Json<Vec<SegmentMetadata>>> {
    let rows = MetaRepo::fetch_for_bahn(&state.pool, &bahn_id).await?;
    if rows.is_empty() {
        return Err(AppError::Core(CoreError::bahn_not_found(&bahn_id)));
    }
    Ok(Json(rows.into_iter().map(|r| r.into_metadata()).collect()))
}

/// GET /bahn/{segment_id}/embeddings
///
/// Presence flags for one segment's embedding row; a plain Bahn id reads
/// the aggregate row.
async fn get_embedding_presence(
    State(state): State<AppState>,
    Path(segment_id): Path<String>,
) -> AppResult<Json<EmbeddingPresence>> {
    EmbeddingRepo::presence(&state.pool, &segment_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::Core(CoreError::segment_not_found(&segment_id)))
}

/// DELETE /bahn/{bahn_id}
///
/// Removes the Bahn and every dependent row in one transaction.
async fn delete_bahn(
    State(state): State<AppState>,
    Path(bahn_id): Path<String>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    if BahnRepo::fetch_bahn_info(&state.pool, &bahn_id).await?.is_none() {
        return Err(AppError::Core(CoreError::bahn_not_found(&bahn_id)));
    }

    let mut tx = state.pool.begin().await?;
    BahnRepo::delete_bahn(&mut *tx, &bahn_id).await?;
    tx.commit().await?;

    tracing::info!(bahn = %bahn_id, "bahn deleted");
    Ok((StatusCode::OK, Json(json!({ "deleted": bahn_id }))))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{bahn_id}", get(get_bahn).delete(delete_bahn))
        .route("/{bahn_id}/meta", get(get_bahn_meta))
        .route("/{bahn_id}/embeddings", get(get_embedding_presence))
}
