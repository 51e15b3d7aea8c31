//! Hierarchical similarity-search endpoint.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use bahn_search::{MultiModalSearcher, SearchRequest, SearchResponse};

use crate::error::AppResult;
use crate::state::AppState;

/// POST /similarity/search
async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> AppResult<Json<SearchResponse>> {
    let response = MultiModalSearcher::search(&state.pool, &request, &state.shutdown).await?;
    tracing::info!(
        target = %request.target_id,
        bahn_hits = response.bahn_similarity.results.len(),
        segments = response.segment_similarity.len(),
        "similarity search served"
    );
    Ok(Json(response))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/search", post(search))
}
