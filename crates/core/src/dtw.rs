//! Shape-exact reranking: adaptive lower-bound pruning and constrained
//! Dynamic Time Warping.
//!
//! The cascade is LB_Kim (four cheap features) -> LB_Keogh (Sakoe-Chiba
//! envelopes) -> cDTW, with how much of it runs decided by the candidate
//! count. Both bounds lower-bound the cDTW distance; the envelope bound is
//! floored at LB_Kim so the cascade stays monotone
//! (`lb_kim <= lb_keogh <= cdtw`).

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::signal::euclidean;

/// Sakoe-Chiba band width as a fraction of the series length.
pub const CDTW_WINDOW_FRACTION: f64 = 0.2;

/// At or below this candidate count the bounds are skipped entirely.
const SMALL_BATCH: usize = 50;

/// Above `SMALL_BATCH` and up to here, LB_Kim keeps the top 60%.
const MEDIUM_BATCH: usize = 200;

/// LB_Kim survivor fraction for medium batches.
const KIM_KEEP_MEDIUM: f64 = 0.6;

/// LB_Kim survivor fraction for large batches.
const KIM_KEEP_LARGE: f64 = 0.9;

/// Hard cap on candidates entering cDTW after LB_Keogh.
const KEOGH_CAP: usize = 500;

// ---------------------------------------------------------------------------
// Lower bounds
// ---------------------------------------------------------------------------

/// LB_Kim: extract four features from each raw series (first row, last
/// row, per-dimension min, per-dimension max) and take the maximum
/// Euclidean feature distance.
///
/// All four features survive any warping alignment, so no resampling is
/// involved; in particular a narrow extremum of a long candidate must not
/// be smoothed away before the min/max comparison, or the bound could
/// exceed the true distance.
///
/// Sequences shorter than 2 samples give `+inf` (nothing to bound).
pub fn lb_kim(query: &[Vec<f64>], candidate: &[Vec<f64>]) -> f64 {
    if query.len() < 2 || candidate.len() < 2 {
        return f64::INFINITY;
    }

    let features = |s: &[Vec<f64>]| {
        let d = s[0].len();
        let mut min = vec![f64::INFINITY; d];
        let mut max = vec![f64::NEG_INFINITY; d];
        for row in s {
            for (i, v) in row.iter().enumerate() {
                min[i] = min[i].min(*v);
                max[i] = max[i].max(*v);
            }
        }
        (s[0].clone(), s[s.len() - 1].clone(), min, max)
    };

    let (qf, ql, qmin, qmax) = features(query);
    let (cf, cl, cmin, cmax) = features(candidate);

    [
        euclidean(&qf, &cf),
        euclidean(&ql, &cl),
        euclidean(&qmin, &cmin),
        euclidean(&qmax, &cmax),
    ]
    .into_iter()
    .fold(0.0, f64::max)
}

/// LB_Keogh: per dimension, build the Sakoe-Chiba envelope on the raw
/// candidate using the same band [`cdtw`] warps within, and accumulate
/// squared deviations of each query sample outside the envelope at its
/// index. Every query index matches a candidate index inside the band on
/// any warping path, so each deviation is a cost that path must pay. The
/// result is floored at [`lb_kim`] to keep the cascade monotone.
pub fn lb_keogh(query: &[Vec<f64>], candidate: &[Vec<f64>]) -> f64 {
    let n = query.len();
    let m = candidate.len();
    if n < 2 || m < 2 {
        return f64::INFINITY;
    }
    let d = query[0].len();
    let band = band_width(n, m);

    let mut total_sq = 0.0;
    for dim in 0..d {
        let col: Vec<f64> = candidate.iter().map(|r| r[dim]).collect();
        for (i, row) in query.iter().enumerate() {
            let lo = i.saturating_sub(band);
            let hi = (i + band).min(m - 1);
            let mut upper = f64::NEG_INFINITY;
            let mut lower = f64::INFINITY;
            for &v in &col[lo..=hi] {
                upper = upper.max(v);
                lower = lower.min(v);
            }

            let q = row[dim];
            if q > upper {
                total_sq += (q - upper) * (q - upper);
            } else if q < lower {
                total_sq += (lower - q) * (lower - q);
            }
        }
    }

    total_sq.sqrt().max(lb_kim(query, candidate))
}

/// Band half-width shared by [`cdtw`] and [`lb_keogh`], widened to the
/// length difference so the end cell stays reachable.
fn band_width(n: usize, m: usize) -> usize {
    ((n.max(m) as f64 * CDTW_WINDOW_FRACTION).floor() as usize)
        .max(n.abs_diff(m))
        .max(1)
}

// ---------------------------------------------------------------------------
// Constrained DTW
// ---------------------------------------------------------------------------

/// Constrained DTW distance between two `(n x d)` series.
///
/// Per dimension: classical min-plus DTW with squared point cost inside a
/// Sakoe-Chiba band of width `max(len_q, len_c) * CDTW_WINDOW_FRACTION`
/// (widened to the length difference so the end cell stays reachable).
/// Per-dimension costs are summed and the square root taken.
pub fn cdtw(query: &[Vec<f64>], candidate: &[Vec<f64>]) -> Result<f64, CoreError> {
    let n = query.len();
    let m = candidate.len();
    if n < 2 || m < 2 {
        return Err(CoreError::Compute(
            "DTW requires at least 2 samples per series".into(),
        ));
    }
    let d = query[0].len();
    if candidate[0].len() != d {
        return Err(CoreError::Compute(format!(
            "DTW dimension mismatch: {d} vs {}",
            candidate[0].len()
        )));
    }

    let band = band_width(n, m);

    let mut total_sq = 0.0;
    for dim in 0..d {
        let q: Vec<f64> = query.iter().map(|r| r[dim]).collect();
        let c: Vec<f64> = candidate.iter().map(|r| r[dim]).collect();
        let cost = cdtw_scalar(&q, &c, band)?;
        total_sq += cost;
    }
    if !total_sq.is_finite() {
        return Err(CoreError::Compute("DTW accumulated a non-finite cost".into()));
    }
    Ok(total_sq.sqrt())
}

/// Scalar banded DTW with squared point cost. Two-row rolling table.
fn cdtw_scalar(q: &[f64], c: &[f64], band: usize) -> Result<f64, CoreError> {
    let n = q.len();
    let m = c.len();

    let mut prev = vec![f64::INFINITY; m];
    let mut curr = vec![f64::INFINITY; m];

    for i in 0..n {
        curr.fill(f64::INFINITY);
        let lo = i.saturating_sub(band);
        let hi = (i + band).min(m - 1);
        for j in lo..=hi {
            let cost = (q[i] - c[j]) * (q[i] - c[j]);
            let best = if i == 0 && j == 0 {
                0.0
            } else {
                let up = if i > 0 { prev[j] } else { f64::INFINITY };
                let left = if j > 0 { curr[j - 1] } else { f64::INFINITY };
                let diag = if i > 0 && j > 0 {
                    prev[j - 1]
                } else {
                    f64::INFINITY
                };
                up.min(left).min(diag)
            };
            curr[j] = cost + best;
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    let result = prev[m - 1];
    if result.is_finite() {
        Ok(result)
    } else {
        Err(CoreError::Compute("DTW band excluded the end cell".into()))
    }
}

// ---------------------------------------------------------------------------
// Adaptive rerank cascade
// ---------------------------------------------------------------------------

/// One candidate entering the rerank cascade, with its fetched series.
#[derive(Debug, Clone)]
pub struct RerankCandidate {
    pub segment_id: String,
    pub bahn_id: String,
    pub series: Vec<Vec<f64>>,
}

/// One reranked result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DtwResult {
    pub segment_id: String,
    pub bahn_id: String,
    /// cDTW distance; `+inf` when the computation failed for this candidate.
    pub distance: f64,
    /// `1 / (1 + distance)`.
    pub similarity_score: f64,
    pub rank: usize,
    pub lb_kim_applied: bool,
    pub lb_keogh_applied: bool,
}

/// Run the adaptive LB cascade and cDTW over a candidate batch.
///
/// `should_cancel` is polled at least once per candidate; cancellation
/// surfaces as [`CoreError::Cancelled`]. A per-candidate cDTW failure
/// does not fail the batch: that candidate's distance becomes `+inf` and
/// it falls to the bottom of the ranking.
pub fn rerank(
    query: &[Vec<f64>],
    candidates: Vec<RerankCandidate>,
    limit: usize,
    should_cancel: &dyn Fn() -> bool,
) -> Result<Vec<DtwResult>, CoreError> {
    let k = candidates.len();
    let (kim_applied, keogh_applied) = (k > SMALL_BATCH, k > MEDIUM_BATCH);

    let mut pool = candidates;

    if kim_applied {
        let keep_fraction = if k <= MEDIUM_BATCH {
            KIM_KEEP_MEDIUM
        } else {
            KIM_KEEP_LARGE
        };
        let keep = ((k as f64 * keep_fraction).ceil() as usize).min(k);
        pool = prune_by_bound(query, pool, keep, lb_kim, should_cancel)?;
    }

    if keogh_applied {
        let keep = KEOGH_CAP.min(pool.len());
        pool = prune_by_bound(query, pool, keep, lb_keogh, should_cancel)?;
    }

    let mut results: Vec<DtwResult> = Vec::with_capacity(pool.len());
    for cand in pool {
        if should_cancel() {
            return Err(CoreError::Cancelled);
        }
        let distance = cdtw(query, &cand.series).unwrap_or(f64::INFINITY);
        results.push(DtwResult {
            segment_id: cand.segment_id,
            bahn_id: cand.bahn_id,
            distance,
            similarity_score: 1.0 / (1.0 + distance),
            rank: 0,
            lb_kim_applied: kim_applied,
            lb_keogh_applied: keogh_applied,
        });
    }

    results.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.segment_id.cmp(&b.segment_id))
    });
    results.truncate(limit);
    for (i, r) in results.iter_mut().enumerate() {
        r.rank = i + 1;
    }
    Ok(results)
}

fn prune_by_bound(
    query: &[Vec<f64>],
    pool: Vec<RerankCandidate>,
    keep: usize,
    bound: fn(&[Vec<f64>], &[Vec<f64>]) -> f64,
    should_cancel: &dyn Fn() -> bool,
) -> Result<Vec<RerankCandidate>, CoreError> {
    let mut scored: Vec<(f64, RerankCandidate)> = Vec::with_capacity(pool.len());
    for cand in pool {
        if should_cancel() {
            return Err(CoreError::Cancelled);
        }
        let b = bound(query, &cand.series);
        scored.push((b, cand));
    }
    scored.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.segment_id.cmp(&b.1.segment_id))
    });
    scored.truncate(keep);
    Ok(scored.into_iter().map(|(_, c)| c).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const NO_CANCEL: &dyn Fn() -> bool = &|| false;

    fn line(n: usize, slope: f64) -> Vec<Vec<f64>> {
        (0..n).map(|i| vec![i as f64 * slope]).collect()
    }

    fn arc3(n: usize, radius: f64, sweep_deg: f64) -> Vec<Vec<f64>> {
        (0..n)
            .map(|i| {
                let theta = (i as f64 / (n - 1) as f64) * sweep_deg.to_radians();
                vec![radius * theta.cos(), radius * theta.sin(), 0.0]
            })
            .collect()
    }

    // -- cDTW ----------------------------------------------------------------

    #[test]
    fn identical_series_have_zero_distance() {
        let s = line(60, 1.0);
        assert!(cdtw(&s, &s).unwrap() < 1e-12);
    }

    #[test]
    fn cdtw_is_symmetric_for_equal_lengths() {
        let a = line(50, 1.0);
        let b = arc3(50, 10.0, 90.0)
            .iter()
            .map(|r| vec![r[0]])
            .collect::<Vec<_>>();
        let ab = cdtw(&a, &b).unwrap();
        let ba = cdtw(&b, &a).unwrap();
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn cdtw_handles_moderate_length_mismatch() {
        let a = line(50, 1.0);
        let b = line(40, 1.25);
        assert!(cdtw(&a, &b).is_ok());
    }

    #[test]
    fn degenerate_series_is_a_compute_error() {
        let a = line(50, 1.0);
        assert!(cdtw(&a, &line(1, 1.0)).is_err());
    }

    // -- Lower bounds --------------------------------------------------------

    #[test]
    fn bounds_are_finite_and_below_cdtw_for_arc_vs_line() {
        // Quarter arc of radius 500 against its straight-line counterpart.
        let arc = arc3(100, 500.0, 90.0);
        let chord: Vec<Vec<f64>> = {
            let first = arc[0].clone();
            let last = arc[99].clone();
            (0..100)
                .map(|i| {
                    let t = i as f64 / 99.0;
                    first
                        .iter()
                        .zip(&last)
                        .map(|(a, b)| a + (b - a) * t)
                        .collect()
                })
                .collect()
        };
        let kim = lb_kim(&arc, &chord);
        let keogh = lb_keogh(&arc, &chord);
        let exact = cdtw(&arc, &chord).unwrap();
        assert!(kim.is_finite() && keogh.is_finite());
        assert!(kim <= keogh + 1e-9);
        assert!(keogh < exact);
    }

    #[test]
    fn noisy_copy_stays_sound_and_close() {
        use rand::Rng;
        let mut rng = rand::rng();
        let q: Vec<Vec<f64>> = (0..100)
            .map(|i| vec![(i as f64 * 0.07).sin(), (i as f64 * 0.05).cos()])
            .collect();
        let c: Vec<Vec<f64>> = q
            .iter()
            .map(|r| r.iter().map(|v| v + rng.random_range(-0.03..0.03)).collect())
            .collect();
        let kim = lb_kim(&q, &c);
        let keogh = lb_keogh(&q, &c);
        let exact = cdtw(&q, &c).unwrap();
        assert!(kim <= keogh + 1e-9);
        assert!(keogh <= exact + 1e-9);
        assert!(exact < 1.0);
    }

    #[test]
    fn narrow_extremum_in_longer_candidate_stays_bounded() {
        // A one-sample dip in a 100-sample candidate aligns exactly with
        // the dip in a 10-sample query, so the true distance is zero; the
        // bounds must not see the dip vanish on the longer series and
        // climb above it.
        let mut q = vec![vec![0.0]; 10];
        q[3] = vec![-5.0];
        let mut c = vec![vec![0.0]; 100];
        c[37] = vec![-5.0];

        let kim = lb_kim(&q, &c);
        let keogh = lb_keogh(&q, &c);
        let exact = cdtw(&q, &c).unwrap();
        assert!(exact < 1e-9);
        assert!(kim <= exact + 1e-9);
        assert!(keogh <= exact + 1e-9);
        assert!(kim <= keogh + 1e-9);
    }

    #[test]
    fn short_series_bounds_are_infinite() {
        let q = line(30, 1.0);
        assert!(lb_kim(&q, &line(1, 1.0)).is_infinite());
        assert!(lb_keogh(&q, &line(1, 1.0)).is_infinite());
    }

    // -- Cascade -------------------------------------------------------------

    fn batch(n_candidates: usize, len: usize) -> Vec<RerankCandidate> {
        (0..n_candidates)
            .map(|i| RerankCandidate {
                segment_id: format!("b_{i}"),
                bahn_id: "b".into(),
                series: line(len, 1.0 + i as f64 * 0.01),
            })
            .collect()
    }

    #[test]
    fn small_batch_skips_both_bounds() {
        let q = line(40, 1.0);
        let out = rerank(&q, batch(10, 40), 5, NO_CANCEL).unwrap();
        assert_eq!(out.len(), 5);
        assert!(out.iter().all(|r| !r.lb_kim_applied && !r.lb_keogh_applied));
        // The exact copy ranks first with distance ~0.
        assert_eq!(out[0].segment_id, "b_0");
        assert!(out[0].distance < 1e-9);
        assert!((out[0].similarity_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn medium_batch_applies_kim_only() {
        let q = line(40, 1.0);
        let out = rerank(&q, batch(100, 40), 10, NO_CANCEL).unwrap();
        assert!(out.iter().all(|r| r.lb_kim_applied && !r.lb_keogh_applied));
        assert_eq!(out[0].segment_id, "b_0");
    }

    #[test]
    fn large_batch_applies_both_bounds() {
        let q = line(40, 1.0);
        let out = rerank(&q, batch(250, 40), 10, NO_CANCEL).unwrap();
        assert!(out.iter().all(|r| r.lb_kim_applied && r.lb_keogh_applied));
        assert_eq!(out[0].segment_id, "b_0");
    }

    #[test]
    fn failed_candidates_sink_to_the_bottom() {
        let q = line(40, 1.0);
        let mut cands = batch(3, 40);
        cands.push(RerankCandidate {
            segment_id: "broken".into(),
            bahn_id: "b".into(),
            series: Vec::new(),
        });
        let out = rerank(&q, cands, 10, NO_CANCEL).unwrap();
        assert_eq!(out.last().unwrap().segment_id, "broken");
        assert!(out.last().unwrap().distance.is_infinite());
        assert_eq!(out.last().unwrap().similarity_score, 0.0);
    }

    #[test]
    fn cancellation_surfaces_as_error() {
        let q = line(40, 1.0);
        let cancelled: &dyn Fn() -> bool = &|| true;
        assert!(matches!(
            rerank(&q, batch(10, 40), 5, cancelled),
            Err(CoreError::Cancelled)
        ));
    }

    // -- Property: LB soundness ---------------------------------------------

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn lb_chain_is_sound_on_random_walks(
            seed_q in proptest::collection::vec(-1.0f64..1.0, 30..120),
            seed_c in proptest::collection::vec(-1.0f64..1.0, 30..120),
        ) {
            // Integrate the raw noise into smooth-ish 2-D walks. Lengths
            // are drawn independently; the band widens to the length
            // difference, so the end cell is always reachable.
            let walk = |seed: &[f64]| {
                let mut x = 0.0;
                let mut y = 0.0;
                let mut out = Vec::with_capacity(seed.len());
                for v in seed {
                    x += v;
                    y += v * 0.5 - 0.1;
                    out.push(vec![x, y]);
                }
                out
            };
            let q = walk(&seed_q);
            let c = walk(&seed_c);

            let kim = lb_kim(&q, &c);
            let keogh = lb_keogh(&q, &c);
            let exact = cdtw(&q, &c).unwrap();

            prop_assert!(kim <= keogh + 1e-9);
            prop_assert!(keogh <= exact + 1e-9);
        }
    }
}
