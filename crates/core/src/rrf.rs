//! Weighted Reciprocal Rank Fusion across embedding modes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::EmbeddingMode;

/// Default rank-smoothing constant `k` in `w / (k + rank)`.
pub const DEFAULT_RRF_K: f64 = 60.0;

/// One entry of a per-mode ranking, as returned by the shape searcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedHit {
    pub segment_id: String,
    pub bahn_id: String,
    /// Cosine distance to the target (ascending is better).
    pub distance: f64,
    /// 1-based rank within the mode.
    pub rank: usize,
}

/// The share one mode contributed to a fused score, kept for
/// explainability of the final ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeContribution {
    pub mode: EmbeddingMode,
    pub rank: usize,
    pub weight: f64,
    pub contribution: f64,
}

/// One fused result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedHit {
    pub segment_id: String,
    pub bahn_id: String,
    pub score: f64,
    pub contributions: Vec<ModeContribution>,
}

/// Fuse per-mode rankings into one ranking.
///
/// Weights are L1-normalized over the modes that actually carry a positive
/// weight; zero-weight modes are skipped entirely. `score(s) =
/// sum over modes of w_mode / (k + rank_mode(s))`. Output is sorted by
/// score descending with segment_id ascending as the tie-break, so equal
/// scores order deterministically.
pub fn fuse(
    rankings: &HashMap<EmbeddingMode, Vec<RankedHit>>,
    weights: &HashMap<EmbeddingMode, f64>,
    k: f64,
) -> Vec<FusedHit> {
    let total: f64 = EmbeddingMode::ALL
        .iter()
        .filter(|m| rankings.contains_key(m))
        .filter_map(|m| weights.get(m))
        .filter(|w| **w > 0.0)
        .sum();
    if total <= 0.0 {
        return Vec::new();
    }

    let mut fused: HashMap<String, FusedHit> = HashMap::new();

    // Iterate modes in a fixed order so contribution lists are stable.
    for mode in EmbeddingMode::ALL {
        let Some(hits) = rankings.get(&mode) else {
            continue;
        };
        let weight = match weights.get(&mode) {
            Some(w) if *w > 0.0 => w / total,
            _ => continue,
        };
        for hit in hits {
            let contribution = weight / (k + hit.rank as f64);
            let entry = fused
                .entry(hit.segment_id.clone())
                .or_insert_with(|| FusedHit {
                    segment_id: hit.segment_id.clone(),
                    bahn_id: hit.bahn_id.clone(),
                    score: 0.0,
                    contributions: Vec::new(),
                });
            entry.score += contribution;
            entry.contributions.push(ModeContribution {
                mode,
                rank: hit.rank,
                weight,
                contribution,
            });
        }
    }

    let mut out: Vec<FusedHit> = fused.into_values().collect();
    out.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.segment_id.cmp(&b.segment_id))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(segment_id: &str, rank: usize) -> RankedHit {
        RankedHit {
            segment_id: segment_id.to_string(),
            bahn_id: segment_id.split('_').next().unwrap_or(segment_id).to_string(),
            distance: 0.01 * rank as f64,
            rank,
        }
    }

    #[test]
    fn equal_weights_tie_breaks_by_segment_id() {
        // Each candidate ranks 1 under exactly one of two modes.
        let mut rankings = HashMap::new();
        rankings.insert(EmbeddingMode::Joint, vec![hit("b_2", 1)]);
        rankings.insert(EmbeddingMode::Position, vec![hit("b_1", 1)]);
        let weights = HashMap::from([
            (EmbeddingMode::Joint, 0.5),
            (EmbeddingMode::Position, 0.5),
        ]);

        let fused = fuse(&rankings, &weights, DEFAULT_RRF_K);
        assert_eq!(fused.len(), 2);
        assert!((fused[0].score - fused[1].score).abs() < 1e-12);
        assert_eq!(fused[0].segment_id, "b_1");
        assert_eq!(fused[1].segment_id, "b_2");
    }

    #[test]
    fn zero_weight_modes_are_skipped() {
        let mut rankings = HashMap::new();
        rankings.insert(EmbeddingMode::Joint, vec![hit("b_1", 1)]);
        rankings.insert(EmbeddingMode::Velocity, vec![hit("b_2", 1)]);
        let weights = HashMap::from([
            (EmbeddingMode::Joint, 1.0),
            (EmbeddingMode::Velocity, 0.0),
        ]);

        let fused = fuse(&rankings, &weights, DEFAULT_RRF_K);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].segment_id, "b_1");
    }

    #[test]
    fn weights_are_l1_normalized() {
        let mut rankings = HashMap::new();
        rankings.insert(EmbeddingMode::Joint, vec![hit("b_1", 1)]);
        let heavy = HashMap::from([(EmbeddingMode::Joint, 10.0)]);
        let light = HashMap::from([(EmbeddingMode::Joint, 0.1)]);

        let a = fuse(&rankings, &heavy, DEFAULT_RRF_K);
        let b = fuse(&rankings, &light, DEFAULT_RRF_K);
        assert!((a[0].score - b[0].score).abs() < 1e-12);
    }

    #[test]
    fn raising_a_weight_cannot_demote_its_best_candidate() {
        // b_1 is best in joint; raising the joint weight must not lower
        // b_1's fused position.
        let mut rankings = HashMap::new();
        rankings.insert(
            EmbeddingMode::Joint,
            vec![hit("b_1", 1), hit("b_2", 2), hit("b_3", 3)],
        );
        rankings.insert(
            EmbeddingMode::Position,
            vec![hit("b_3", 1), hit("b_2", 2), hit("b_1", 3)],
        );

        let base = HashMap::from([
            (EmbeddingMode::Joint, 0.5),
            (EmbeddingMode::Position, 0.5),
        ]);
        let boosted = HashMap::from([
            (EmbeddingMode::Joint, 0.9),
            (EmbeddingMode::Position, 0.1),
        ]);

        let rank_of = |fused: &[FusedHit], id: &str| {
            fused.iter().position(|h| h.segment_id == id).unwrap()
        };
        let before = fuse(&rankings, &base, DEFAULT_RRF_K);
        let after = fuse(&rankings, &boosted, DEFAULT_RRF_K);
        assert!(rank_of(&after, "b_1") <= rank_of(&before, "b_1"));
    }

    #[test]
    fn contributions_record_every_mode() {
        let mut rankings = HashMap::new();
        rankings.insert(EmbeddingMode::Joint, vec![hit("b_1", 1)]);
        rankings.insert(EmbeddingMode::Position, vec![hit("b_1", 4)]);
        let weights = HashMap::from([
            (EmbeddingMode::Joint, 0.7),
            (EmbeddingMode::Position, 0.3),
        ]);

        let fused = fuse(&rankings, &weights, DEFAULT_RRF_K);
        assert_eq!(fused[0].contributions.len(), 2);
        let sum: f64 = fused[0].contributions.iter().map(|c| c.contribution).sum();
        assert!((sum - fused[0].score).abs() < 1e-12);
    }

    #[test]
    fn empty_weights_produce_empty_ranking() {
        let mut rankings = HashMap::new();
        rankings.insert(EmbeddingMode::Joint, vec![hit("b_1", 1)]);
        let fused = fuse(&rankings, &HashMap::new(), DEFAULT_RRF_K);
        assert!(fused.is_empty());
    }
}
