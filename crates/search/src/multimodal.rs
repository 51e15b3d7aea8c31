//! Two-phase hierarchical similarity search.
//!
//! Phase 1 compares the target's whole-Bahn aggregate against other
//! aggregates; phase 2 repeats the pipeline per proper segment of the
//! target Bahn with segment scope. Each phase runs the same chain:
//! optional metadata prefilter, per-mode nearest-neighbor search, RRF
//! fusion, metadata enrichment. A mode the target has no vector for is
//! dropped; a phase with no usable mode carries an error marker instead
//! of failing the request.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use bahn_core::dtw::DtwResult;
use bahn_core::metadata::SegmentMetadata;
use bahn_core::rrf::{fuse, ModeContribution, DEFAULT_RRF_K};
use bahn_core::types::{bahn_id_of, EmbeddingMode, SearchScope};
use bahn_db::repositories::{BahnRepo, MetaRepo};

use crate::error::SearchError;
use crate::filter::{FilterFeature, FilterSearcher, DEFAULT_TOLERANCE};
use crate::rerank::DtwReranker;
use crate::shape::ShapeSearcher;

const DEFAULT_LIMIT: usize = 10;

/// Degradation marker: the target carries no vector in any requested mode.
const NO_USABLE_MODE: &str = "no embeddings available for any requested mode";

// ---------------------------------------------------------------------------
// Request / response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub target_id: String,
    /// Modes to search; defaults to all five.
    #[serde(default)]
    pub modes: Option<Vec<EmbeddingMode>>,
    /// Per-mode weights; omitted modes default to 1.0.
    #[serde(default)]
    pub weights: HashMap<EmbeddingMode, f64>,
    /// Metadata prefilter features; empty disables the prefilter.
    #[serde(default)]
    pub prefilter: Vec<FilterFeature>,
    /// Relative tolerance for the prefilter, default 0.10.
    #[serde(default)]
    pub tolerance: Option<f64>,
    /// Results kept per phase, default 10.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Apply DTW reranking to the Bahn-level results.
    #[serde(default)]
    pub rerank: bool,
}

impl SearchRequest {
    fn modes(&self) -> Vec<EmbeddingMode> {
        match &self.modes {
            Some(modes) if !modes.is_empty() => {
                // Preserve request order while dropping duplicates.
                let mut seen = Vec::new();
                for mode in modes {
                    if !seen.contains(mode) {
                        seen.push(*mode);
                    }
                }
                seen
            }
            _ => EmbeddingMode::ALL.to_vec(),
        }
    }

    fn weight(&self, mode: EmbeddingMode) -> f64 {
        self.weights.get(&mode).copied().unwrap_or(1.0)
    }

    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).max(1)
    }

    fn tolerance(&self) -> f64 {
        self.tolerance.unwrap_or(DEFAULT_TOLERANCE)
    }
}

/// One enriched hit of a fused ranking.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarSegment {
    pub segment_id: String,
    pub bahn_id: String,
    pub score: f64,
    pub contributions: Vec<ModeContribution>,
    pub features: Option<SegmentMetadata>,
}

/// Fused result of one phase (Bahn level or one target segment).
#[derive(Debug, Clone, Serialize)]
pub struct ModeFusion {
    pub results: Vec<SimilarSegment>,
    pub modes_used: Vec<EmbeddingMode>,
    /// L1-normalized weights over the modes actually used.
    pub weights_used: HashMap<EmbeddingMode, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dtw_reranked: Option<Vec<DtwResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModeFusion {
    fn degraded(reason: impl Into<String>) -> Self {
        ModeFusion {
            results: Vec::new(),
            modes_used: Vec::new(),
            weights_used: HashMap::new(),
            dtw_reranked: None,
            error: Some(reason.into()),
        }
    }

    /// True when the phase degraded because the target has no usable
    /// embedding mode (as opposed to, say, a prefilter that eliminated
    /// every candidate).
    fn lacks_usable_mode(&self) -> bool {
        self.error.as_deref() == Some(NO_USABLE_MODE)
    }
}

/// Phase-2 entry for one proper segment of the target Bahn.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentSimilarity {
    pub target_segment: String,
    pub target_segment_features: Option<SegmentMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similar_segments: Option<ModeFusion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub target_id: String,
    pub target_bahn_id: String,
    pub target_bahn_features: Option<SegmentMetadata>,
    pub bahn_similarity: ModeFusion,
    pub segment_similarity: Vec<SegmentSimilarity>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives the two-phase hierarchical search.
pub struct MultiModalSearcher;

impl MultiModalSearcher {
    pub async fn search(
        pool: &PgPool,
        request: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse, SearchError> {
        let target_bahn_id = bahn_id_of(&request.target_id).to_string();

        // An unknown target is a NotFound, not a degraded search.
        if BahnRepo::fetch_bahn_info(pool, &target_bahn_id).await?.is_none() {
            return Err(bahn_core::CoreError::bahn_not_found(&target_bahn_id).into());
        }

        let target_bahn_features = MetaRepo::fetch(pool, &target_bahn_id)
            .await?
            .map(|row| row.into_metadata());

        // Phase 1: Bahn scope against the whole-Bahn aggregate.
        let mut bahn_similarity = Self::fuse_scope(
            pool,
            request,
            &target_bahn_id,
            SearchScope::Bahn,
        )
        .await?;

        if request.rerank && !bahn_similarity.results.is_empty() {
            let candidate_ids: Vec<String> = bahn_similarity
                .results
                .iter()
                .map(|r| r.segment_id.clone())
                .collect();
            match DtwReranker::rerank(
                pool,
                &target_bahn_id,
                &candidate_ids,
                request.limit(),
                cancel,
            )
            .await
            {
                Ok(reranked) => bahn_similarity.dtw_reranked = Some(reranked),
                // Reranking is an optional refinement; its failure must
                // not discard the fused ranking.
                Err(err) => {
                    tracing::warn!(error = %err, "dtw rerank failed, keeping rrf order");
                }
            }
        }

        // Phase 2: segment scope, one pass per proper segment. A target
        // with no usable mode at all yields the phase-1 marker and an
        // empty segment list instead of one degraded entry per segment.
        let segment_ids = if bahn_similarity.lacks_usable_mode() {
            Vec::new()
        } else {
            BahnRepo::segment_ids(pool, &target_bahn_id).await?
        };
        let mut segment_similarity = Vec::with_capacity(segment_ids.len());
        for segment_id in segment_ids {
            if cancel.is_cancelled() {
                return Err(bahn_core::CoreError::Cancelled.into());
            }
            let features = MetaRepo::fetch(pool, &segment_id)
                .await?
                .map(|row| row.into_metadata());

            match Self::fuse_scope(pool, request, &segment_id, SearchScope::Segment).await {
                Ok(fusion) => segment_similarity.push(SegmentSimilarity {
                    target_segment: segment_id,
                    target_segment_features: features,
                    similar_segments: Some(fusion),
                    error: None,
                }),
                Err(err) => {
                    tracing::warn!(segment = %segment_id, error = %err, "segment search failed");
                    segment_similarity.push(SegmentSimilarity {
                        target_segment: segment_id,
                        target_segment_features: features,
                        similar_segments: None,
                        error: Some(sanitize(&err)),
                    });
                }
            }
        }

        Ok(SearchResponse {
            target_id: request.target_id.clone(),
            target_bahn_id,
            target_bahn_features,
            bahn_similarity,
            segment_similarity,
        })
    }

    /// One prefilter + per-mode NN + fusion + enrichment pass.
    async fn fuse_scope(
        pool: &PgPool,
        request: &SearchRequest,
        target_id: &str,
        scope: SearchScope,
    ) -> Result<ModeFusion, SearchError> {
        let limit = request.limit();

        let candidates = if request.prefilter.is_empty() {
            None
        } else {
            Some(
                FilterSearcher::filter(
                    pool,
                    target_id,
                    &request.prefilter,
                    request.tolerance(),
                    scope,
                )
                .await?,
            )
        };
        if matches!(&candidates, Some(ids) if ids.is_empty()) {
            return Ok(ModeFusion::degraded("prefilter eliminated every candidate"));
        }

        let mut rankings = HashMap::new();
        let mut weights = HashMap::new();
        for mode in request.modes() {
            let weight = request.weight(mode);
            if weight <= 0.0 {
                continue;
            }
            let hits =
                ShapeSearcher::nn(pool, target_id, mode, limit, candidates.as_deref(), scope)
                    .await?;
            // An empty ranking means the target has no vector for this
            // mode (or nothing is stored in scope); drop the mode.
            if hits.is_empty() {
                continue;
            }
            rankings.insert(mode, hits);
            weights.insert(mode, weight);
        }

        if rankings.is_empty() {
            return Ok(ModeFusion::degraded(NO_USABLE_MODE));
        }

        let modes_used: Vec<EmbeddingMode> = EmbeddingMode::ALL
            .iter()
            .copied()
            .filter(|m| rankings.contains_key(m))
            .collect();
        let total: f64 = weights.values().sum();
        let weights_used: HashMap<EmbeddingMode, f64> =
            weights.iter().map(|(m, w)| (*m, w / total)).collect();

        let fused = fuse(&rankings, &weights, DEFAULT_RRF_K);

        let mut results = Vec::with_capacity(limit.min(fused.len()));
        for hit in fused.into_iter().take(limit) {
            let features = MetaRepo::fetch(pool, &hit.segment_id)
                .await?
                .map(|row| row.into_metadata());
            results.push(SimilarSegment {
                segment_id: hit.segment_id,
                bahn_id: hit.bahn_id,
                score: hit.score,
                contributions: hit.contributions,
                features,
            });
        }

        Ok(ModeFusion {
            results,
            modes_used,
            weights_used,
            dtw_reranked: None,
            error: None,
        })
    }
}

/// Keep store internals out of user-visible error markers.
fn sanitize(err: &SearchError) -> String {
    match err {
        SearchError::Core(core) => core.to_string(),
        SearchError::Db(_) => "store query failed".to_string(),
    }
}
