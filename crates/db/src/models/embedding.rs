//! Models for the `bewegungsdaten.bahn_embeddings` table.
//!
//! The five vector columns (`joint_embedding`, `position_embedding`,
//! `orientation_embedding`, `velocity_embedding`, `metadata_embedding`)
//! are pgvector columns of fixed dimension per mode. They never appear in
//! `FromRow` structs; reads cast them to text and parse, writes bind a
//! text literal with a `::vector` cast.

use serde::Serialize;
use sqlx::FromRow;

/// Vector-distance hit from a nearest-neighbor query, before rank fusion.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct NeighborRow {
    pub segment_id: String,
    pub bahn_id: String,
    /// Cosine distance as reported by the `<=>` operator.
    pub distance: f64,
}

/// Presence flags for one segment's embedding row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EmbeddingPresence {
    pub segment_id: String,
    pub bahn_id: String,
    pub sample_count: i32,
    pub has_joint: bool,
    pub has_position: bool,
    pub has_orientation: bool,
    pub has_velocity: bool,
    pub has_metadata: bool,
}
