//! DTW reranking driver: loads position tracks and runs the adaptive
//! lower-bound cascade from `bahn_core::dtw`.
//!
//! The cascade itself is pure CPU work; batches bigger than a few hundred
//! candidates move to `spawn_blocking` so the request task keeps yielding.
//! Ordering of the final ranking is deterministic either way.

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use bahn_core::dtw::{rerank, DtwResult, RerankCandidate};
use bahn_core::types::bahn_id_of;
use bahn_core::CoreError;
use bahn_db::repositories::BahnRepo;

use crate::error::SearchError;

/// Batch size above which the cascade runs on the blocking pool.
const BLOCKING_THRESHOLD: usize = 300;

/// Orchestrates DTW reranking over stored position tracks.
pub struct DtwReranker;

impl DtwReranker {
    /// Rerank `candidate_ids` by constrained DTW distance of their
    /// position tracks against the target's, keeping the best `limit`.
    ///
    /// Candidates without stored positions stay in the batch and fall to
    /// the bottom with an infinite distance.
    pub async fn rerank(
        pool: &PgPool,
        target_id: &str,
        candidate_ids: &[String],
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<DtwResult>, SearchError> {
        let target_series = BahnRepo::fetch_segment_series(pool, target_id).await?;
        let query = target_series.position_track();
        if query.is_empty() {
            return Err(CoreError::DataAbsent(format!(
                "no position samples stored for {target_id}"
            ))
            .into());
        }

        let mut candidates = Vec::with_capacity(candidate_ids.len());
        for id in candidate_ids {
            if cancel.is_cancelled() {
                return Err(CoreError::Cancelled.into());
            }
            let series = BahnRepo::fetch_segment_series(pool, id).await?;
            candidates.push(RerankCandidate {
                segment_id: id.clone(),
                bahn_id: bahn_id_of(id).to_string(),
                series: series.position_track(),
            });
        }

        let batch = candidates.len();
        let results = if batch > BLOCKING_THRESHOLD {
            let token = cancel.clone();
            tokio::task::spawn_blocking(move || {
                rerank(&query, candidates, limit, &|| token.is_cancelled())
            })
            .await
            .map_err(|join_err| CoreError::Compute(format!("rerank task failed: {join_err}")))??
        } else {
            rerank(&query, candidates, limit, &|| cancel.is_cancelled())?
        };

        tracing::debug!(
            target = target_id,
            batch,
            kept = results.len(),
            "dtw rerank complete"
        );
        Ok(results)
    }
}
