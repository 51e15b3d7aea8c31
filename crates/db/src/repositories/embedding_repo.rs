//! Repository for the `bahn_embeddings` table.
//!
//! The five mode columns are pgvector values with a per-mode fixed
//! dimension and cosine HNSW indexes. Because the crate uses runtime
//! queries, vectors are bound as text literals with a `::vector` cast and
//! read back through a `::text` cast.

use sqlx::{PgConnection, PgPool, Row};

use bahn_core::embedding::SegmentEmbeddings;
use bahn_core::types::{EmbeddingMode, SearchScope};

use crate::models::embedding::{EmbeddingPresence, NeighborRow};
use crate::vector::{parse_vector, vector_literal};

/// `hnsw.ef_search` applied per nearest-neighbor transaction.
const EF_SEARCH: i32 = 100;

/// Provides vector storage and approximate nearest-neighbor queries.
pub struct EmbeddingRepo;

impl EmbeddingRepo {
    /// Insert or refresh the embedding row of one segment.
    ///
    /// Null vectors stay null; a recomputation that loses a mode (for
    /// example after a partial re-ingest) overwrites the old vector with
    /// null rather than keeping it stale.
    pub async fn upsert(
        conn: &mut PgConnection,
        embeddings: &SegmentEmbeddings,
    ) -> Result<(), sqlx::Error> {
        let literals: Vec<Option<String>> = EmbeddingMode::ALL
            .iter()
            .map(|mode| embeddings.vector(*mode).map(|v| vector_literal(v)))
            .collect();

        sqlx::query(
            "INSERT INTO bewegungsdaten.bahn_embeddings (\
                segment_id, bahn_id, sample_count, \
                joint_embedding, position_embedding, orientation_embedding, \
                velocity_embedding, metadata_embedding\
             ) VALUES ($1, $2, $3, $4::vector, $5::vector, $6::vector, $7::vector, $8::vector) \
             ON CONFLICT (segment_id) DO UPDATE SET \
                bahn_id = EXCLUDED.bahn_id, \
                sample_count = EXCLUDED.sample_count, \
                joint_embedding = EXCLUDED.joint_embedding, \
                position_embedding = EXCLUDED.position_embedding, \
                orientation_embedding = EXCLUDED.orientation_embedding, \
                velocity_embedding = EXCLUDED.velocity_embedding, \
                metadata_embedding = EXCLUDED.metadata_embedding",
        )
        .bind(&embeddings.segment_id)
        .bind(&embeddings.bahn_id)
        .bind(embeddings.sample_count)
        .bind(&literals[0])
        .bind(&literals[1])
        .bind(&literals[2])
        .bind(&literals[3])
        .bind(&literals[4])
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Read one stored vector, `Ok(None)` when the row or the mode column
    /// is null or the segment is unknown.
    pub async fn fetch_vector(
        pool: &PgPool,
        segment_id: &str,
        mode: EmbeddingMode,
    ) -> Result<Option<Vec<f32>>, sqlx::Error> {
        let column = mode.column();
        let query = format!(
            "SELECT {column}::text AS vector_text \
             FROM bewegungsdaten.bahn_embeddings WHERE segment_id = $1"
        );
        let row = sqlx::query(&query)
            .bind(segment_id)
            .fetch_optional(pool)
            .await?;

        Ok(row
            .and_then(|r| r.try_get::<Option<String>, _>("vector_text").ok().flatten())
            .and_then(|text| parse_vector(&text)))
    }

    /// Which modes a segment actually has vectors for.
    pub async fn presence(
        pool: &PgPool,
        segment_id: &str,
    ) -> Result<Option<EmbeddingPresence>, sqlx::Error> {
        sqlx::query_as::<_, EmbeddingPresence>(
            "SELECT segment_id, bahn_id, sample_count, \
                    joint_embedding IS NOT NULL AS has_joint, \
                    position_embedding IS NOT NULL AS has_position, \
                    orientation_embedding IS NOT NULL AS has_orientation, \
                    velocity_embedding IS NOT NULL AS has_velocity, \
                    metadata_embedding IS NOT NULL AS has_metadata \
             FROM bewegungsdaten.bahn_embeddings WHERE segment_id = $1",
        )
        .bind(segment_id)
        .fetch_optional(pool)
        .await
    }

    /// Cosine nearest neighbors of a query vector in one mode.
    ///
    /// Runs inside a transaction so `SET LOCAL hnsw.ef_search` scopes to
    /// this query. `candidate_ids`, when given, restricts the search to
    /// the prefilter's survivors; the query segment itself is always
    /// excluded. Results come back distance-ascending with the segment id
    /// as a deterministic tie-break.
    pub async fn nearest_neighbors(
        pool: &PgPool,
        mode: EmbeddingMode,
        query_vector: &[f32],
        scope: SearchScope,
        exclude_segment_id: &str,
        candidate_ids: Option<&[String]>,
        limit: i64,
    ) -> Result<Vec<NeighborRow>, sqlx::Error> {
        let column = mode.column();
        let literal = vector_literal(query_vector);

        let mut conditions = vec![
            format!("{column} IS NOT NULL"),
            "segment_id <> $2".to_string(),
        ];
        match scope {
            SearchScope::Bahn => conditions.push("segment_id = bahn_id".into()),
            SearchScope::Segment => conditions.push("segment_id <> bahn_id".into()),
            SearchScope::Any => {}
        }
        if candidate_ids.is_some() {
            conditions.push("segment_id = ANY($4)".into());
        }

        let query = format!(
            "SELECT segment_id, bahn_id, ({column} <=> $1::vector)::float8 AS distance \
             FROM bewegungsdaten.bahn_embeddings \
             WHERE {} \
             ORDER BY {column} <=> $1::vector, segment_id \
             LIMIT $3",
            conditions.join(" AND "),
        );

        let mut tx = pool.begin().await?;
        sqlx::query(&format!("SET LOCAL hnsw.ef_search = {EF_SEARCH}"))
            .execute(&mut *tx)
            .await?;

        let mut q = sqlx::query_as::<_, NeighborRow>(&query)
            .bind(&literal)
            .bind(exclude_segment_id)
            .bind(limit);
        if let Some(ids) = candidate_ids {
            q = q.bind(ids);
        }
        let rows = q.fetch_all(&mut *tx).await?;
        tx.commit().await?;
        tracing::debug!(
            mode = mode.as_str(),
            hits = rows.len(),
            "nearest-neighbor query executed"
        );
        Ok(rows)
    }
}
