//! Shared identifier conventions and the embedding-mode enum.
//!
//! Identifier rule: a row with `segment_id == bahn_id` is the whole-Bahn
//! aggregate; a proper segment carries `segment_id = "{bahn_id}_{n}"` with
//! `n >= 1`. Every similarity query dispatches on this distinction.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Identifier helpers
// ---------------------------------------------------------------------------

/// Whether `segment_id` denotes the whole-Bahn aggregate row.
pub fn is_aggregate(bahn_id: &str, segment_id: &str) -> bool {
    bahn_id == segment_id
}

/// Derive the owning Bahn id from any segment id.
///
/// `"1719234567_3"` → `"1719234567"`; an id without a `_{n}` suffix is
/// already a Bahn id and is returned unchanged.
pub fn bahn_id_of(segment_id: &str) -> &str {
    match segment_id.split_once('_') {
        Some((bahn, suffix)) if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) => {
            bahn
        }
        _ => segment_id,
    }
}

/// Build the proper-segment id for position `n` (1-based) within a Bahn.
pub fn segment_id_for(bahn_id: &str, n: usize) -> String {
    format!("{bahn_id}_{n}")
}

// ---------------------------------------------------------------------------
// Embedding modes
// ---------------------------------------------------------------------------

/// The five embedding flavours.
///
/// Dimension and resample count are properties of the calculator, not of
/// the storage layer; the database columns are sized to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingMode {
    Joint,
    Position,
    Orientation,
    Velocity,
    Metadata,
}

impl EmbeddingMode {
    pub const ALL: [EmbeddingMode; 5] = [
        EmbeddingMode::Joint,
        EmbeddingMode::Position,
        EmbeddingMode::Orientation,
        EmbeddingMode::Velocity,
        EmbeddingMode::Metadata,
    ];

    /// Output dimensionality of the stored vector.
    pub fn dim(self) -> usize {
        match self {
            EmbeddingMode::Joint => 60,
            EmbeddingMode::Position => 30,
            EmbeddingMode::Orientation => 30,
            EmbeddingMode::Velocity => 27,
            EmbeddingMode::Metadata => 14,
        }
    }

    /// Resample count N for the time-series modes (`None` for metadata,
    /// which is derived from the statistics row instead).
    pub fn sample_count(self) -> Option<usize> {
        match self {
            EmbeddingMode::Joint | EmbeddingMode::Position | EmbeddingMode::Orientation => Some(10),
            EmbeddingMode::Velocity => Some(9),
            EmbeddingMode::Metadata => None,
        }
    }

    /// Column name of the vector in the embeddings table.
    pub fn column(self) -> &'static str {
        match self {
            EmbeddingMode::Joint => "joint_embedding",
            EmbeddingMode::Position => "position_embedding",
            EmbeddingMode::Orientation => "orientation_embedding",
            EmbeddingMode::Velocity => "velocity_embedding",
            EmbeddingMode::Metadata => "metadata_embedding",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EmbeddingMode::Joint => "joint",
            EmbeddingMode::Position => "position",
            EmbeddingMode::Orientation => "orientation",
            EmbeddingMode::Velocity => "velocity",
            EmbeddingMode::Metadata => "metadata",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "joint" => Ok(EmbeddingMode::Joint),
            "position" => Ok(EmbeddingMode::Position),
            "orientation" => Ok(EmbeddingMode::Orientation),
            "velocity" => Ok(EmbeddingMode::Velocity),
            "metadata" => Ok(EmbeddingMode::Metadata),
            other => Err(CoreError::Validation(format!(
                "Unknown embedding mode: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for EmbeddingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Search scope
// ---------------------------------------------------------------------------

/// Which rows a nearest-neighbour query may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    /// Only whole-Bahn aggregate rows (`segment_id = bahn_id`).
    Bahn,
    /// Only proper segments (`segment_id != bahn_id`).
    Segment,
    /// No scope restriction.
    Any,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bahn_id_of_strips_numeric_suffix() {
        assert_eq!(bahn_id_of("1719234567_3"), "1719234567");
        assert_eq!(bahn_id_of("1719234567_12"), "1719234567");
    }

    #[test]
    fn bahn_id_of_keeps_plain_bahn_id() {
        assert_eq!(bahn_id_of("1719234567"), "1719234567");
    }

    #[test]
    fn bahn_id_of_ignores_non_numeric_suffix() {
        assert_eq!(bahn_id_of("run_alpha"), "run_alpha");
    }

    #[test]
    fn aggregate_rule_matches_identifier_convention() {
        assert!(is_aggregate("1719234567", "1719234567"));
        assert!(!is_aggregate("1719234567", "1719234567_1"));
    }

    #[test]
    fn mode_dims_match_flattened_sample_counts() {
        assert_eq!(EmbeddingMode::Joint.dim(), 10 * 6);
        assert_eq!(EmbeddingMode::Position.dim(), 10 * 3);
        assert_eq!(EmbeddingMode::Orientation.dim(), 10 * 3);
        assert_eq!(EmbeddingMode::Velocity.dim(), 9 * 3);
        assert_eq!(EmbeddingMode::Metadata.dim(), 14);
    }

    #[test]
    fn mode_round_trips_through_parse() {
        for mode in EmbeddingMode::ALL {
            assert_eq!(EmbeddingMode::parse(mode.as_str()).unwrap(), mode);
        }
        assert!(EmbeddingMode::parse("pose").is_err());
    }
}
