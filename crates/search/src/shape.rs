//! Nearest-neighbor lookup in embedding space for a single mode.

use sqlx::PgPool;

use bahn_core::rrf::RankedHit;
use bahn_core::types::{EmbeddingMode, SearchScope};
use bahn_db::repositories::EmbeddingRepo;

use crate::error::SearchError;

/// Cosine nearest-neighbor search over stored embeddings.
pub struct ShapeSearcher;

impl ShapeSearcher {
    /// Nearest neighbors of `target_id` in one embedding mode.
    ///
    /// Returns an empty ranking when the target has no stored vector for
    /// the mode; hits carry ascending ranks starting at 1.
    pub async fn nn(
        pool: &PgPool,
        target_id: &str,
        mode: EmbeddingMode,
        limit: usize,
        candidates: Option<&[String]>,
        scope: SearchScope,
    ) -> Result<Vec<RankedHit>, SearchError> {
        let Some(query_vector) = EmbeddingRepo::fetch_vector(pool, target_id, mode).await? else {
            return Ok(Vec::new());
        };

        let rows = EmbeddingRepo::nearest_neighbors(
            pool,
            mode,
            &query_vector,
            scope,
            target_id,
            candidates,
            limit as i64,
        )
        .await?;

        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| RankedHit {
                segment_id: row.segment_id,
                bahn_id: row.bahn_id,
                distance: row.distance,
                rank: i + 1,
            })
            .collect())
    }
}
