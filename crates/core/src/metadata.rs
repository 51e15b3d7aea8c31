//! Per-segment metadata derivation: aggregate kinematic statistics,
//! direction and extent, and the geometric movement-type classifier.
//!
//! Statistics are rounded to 3 decimal places. A missing channel leaves its
//! stat group `None`; the record is still produced so the row can be
//! written with nulls.

use serde::{Deserialize, Serialize};

use crate::channels::SegmentSeries;
use crate::signal::{euclidean, resample};

/// Degenerate-length guard for direction vectors and chords.
const EPS: f64 = 1e-9;

/// Downsample count for the movement-type classifier.
const CLASSIFY_SAMPLES: usize = 20;

/// Interior points probed for chord deviation.
const DEVIATION_PROBES: usize = 10;

/// Maximum triples sampled for circle fitting.
const MAX_TRIPLES: usize = 8;

/// Circumradius estimates above this are treated as "straight" noise.
const MAX_RADIUS: f64 = 1000.0;

/// Deviation ratio below which a track is linear.
const LINEAR_RATIO: f64 = 0.03;

/// Deviation ratio above which a non-circular track is a spline.
const SPLINE_RATIO: f64 = 0.9;

/// Deviation ratio above which a non-fitting track still counts as circular.
const CIRCULAR_RATIO: f64 = 0.08;

/// Maximum coefficient of variation of the radius estimates for a circle fit.
const RADIUS_CV_LIMIT: f64 = 0.4;

/// Minimum summed turn angle (degrees) for a circle fit.
const MIN_TOTAL_ANGLE_DEG: f64 = 20.0;

// ---------------------------------------------------------------------------
// Statistics records
// ---------------------------------------------------------------------------

/// min/max/mean/median/std of one scalar channel.
///
/// The `median` field historically stores the mean (the recorder's schema
/// kept the column name); both are filled with the same value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
}

impl ChannelStats {
    /// Compute rounded stats over a non-empty sample set.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for &v in samples {
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }
        let mean = sum / n;
        let var = samples.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        Some(Self {
            min: round3(min),
            max: round3(max),
            mean: round3(mean),
            median: round3(mean),
            std: round3(var.sqrt()),
        })
    }
}

/// Per-axis position statistics plus the first/last samples of the track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionStats {
    pub x: ChannelStats,
    pub y: ChannelStats,
    pub z: ChannelStats,
    pub first: [f64; 3],
    pub last: [f64; 3],
}

impl PositionStats {
    /// Representative 3-D position (per-axis mean), used by the
    /// `position_3d` prefilter.
    pub fn representative(&self) -> [f64; 3] {
        [self.x.mean, self.y.mean, self.z.mean]
    }
}

/// Per-joint min/max over the six axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointExtrema {
    pub min: [f64; 6],
    pub max: [f64; 6],
}

/// One derived metadata record, for a proper segment or for the whole-Bahn
/// aggregate (`segment_id == bahn_id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMetadata {
    pub bahn_id: String,
    pub segment_id: String,
    /// Seconds, from the integer-nanosecond timestamp span. Non-negative.
    pub duration: Option<f64>,
    /// Tool weight (kg), carried over from the Bahn info.
    pub weight: Option<f64>,
    /// Chord length first -> last (mm), non-negative.
    pub length: Option<f64>,
    /// Unit direction first -> last, or (0,0,0) for a degenerate chord.
    pub direction: Option<[f64; 3]>,
    /// Movement-type string over {l, c, s}.
    pub movement_type: Option<String>,
    pub position: Option<PositionStats>,
    /// Stats over the per-sample rotation angle (degrees).
    pub orientation: Option<ChannelStats>,
    /// Stats over measured TCP speed.
    pub twist: Option<ChannelStats>,
    /// Stats over measured TCP acceleration.
    pub acceleration: Option<ChannelStats>,
    pub joints: Option<JointExtrema>,
}

// ---------------------------------------------------------------------------
// Segment-level computation
// ---------------------------------------------------------------------------

/// Reduce a raw per-segment series to one metadata record.
///
/// Returns `None` only when the series carries no samples in any channel.
pub fn compute_segment_metadata(
    bahn_id: &str,
    segment_id: &str,
    series: &SegmentSeries,
    weight: Option<f64>,
) -> Option<SegmentMetadata> {
    if series.is_empty() {
        return None;
    }

    let duration = series
        .timestamp_span()
        .map(|(min, max)| round3(((max - min).max(0)) as f64 / 1e9));

    let track = series.position_track();
    let (length, direction) = chord_length_direction(&track);

    let position = position_stats(series);
    let orientation = orientation_stats(series);
    let twist =
        ChannelStats::from_samples(&series.twist.iter().map(|r| r.tcp_speed).collect::<Vec<_>>());
    let acceleration =
        ChannelStats::from_samples(&series.accel.iter().map(|r| r.tcp_accel).collect::<Vec<_>>());
    let joints = joint_extrema(series);

    let movement_type = (!track.is_empty()).then(|| classify_movement(&track).to_string());

    Some(SegmentMetadata {
        bahn_id: bahn_id.to_string(),
        segment_id: segment_id.to_string(),
        duration,
        weight,
        length,
        direction,
        movement_type,
        position,
        orientation,
        twist,
        acceleration,
        joints,
    })
}

/// Roll the per-segment records and the raw aggregate into the whole-Bahn
/// metadata row (`segment_id = bahn_id`).
///
/// The movement type concatenates the first character of each segment's
/// type in segment order; length is the sum of segment lengths; direction
/// comes from the Bahn's overall first and last position. The remaining
/// statistics are recomputed from the raw aggregate, not averaged.
pub fn aggregate_bahn_metadata(
    bahn_id: &str,
    segments: &[SegmentMetadata],
    whole: &SegmentSeries,
    weight: Option<f64>,
) -> Option<SegmentMetadata> {
    let mut meta = compute_segment_metadata(bahn_id, bahn_id, whole, weight)?;

    let concatenated: String = segments
        .iter()
        .filter_map(|s| s.movement_type.as_ref())
        .filter_map(|mt| mt.chars().next())
        .collect();
    meta.movement_type = (!concatenated.is_empty()).then_some(concatenated);

    let summed: f64 = segments.iter().filter_map(|s| s.length).sum();
    if meta.length.is_some() {
        meta.length = Some(round3(summed));
    }

    Some(meta)
}

fn chord_length_direction(track: &[Vec<f64>]) -> (Option<f64>, Option<[f64; 3]>) {
    let (Some(first), Some(last)) = (track.first(), track.last()) else {
        return (None, None);
    };
    let length = euclidean(first, last);
    let direction = if length > EPS {
        [
            round3((last[0] - first[0]) / length),
            round3((last[1] - first[1]) / length),
            round3((last[2] - first[2]) / length),
        ]
    } else {
        [0.0, 0.0, 0.0]
    };
    (Some(round3(length)), Some(direction))
}

fn position_stats(series: &SegmentSeries) -> Option<PositionStats> {
    if series.position.is_empty() {
        return None;
    }
    let xs: Vec<f64> = series.position.iter().map(|r| r.x).collect();
    let ys: Vec<f64> = series.position.iter().map(|r| r.y).collect();
    let zs: Vec<f64> = series.position.iter().map(|r| r.z).collect();
    let first = series.position.first().map(|r| [r.x, r.y, r.z])?;
    let last = series.position.last().map(|r| [r.x, r.y, r.z])?;
    Some(PositionStats {
        x: ChannelStats::from_samples(&xs)?,
        y: ChannelStats::from_samples(&ys)?,
        z: ChannelStats::from_samples(&zs)?,
        first,
        last,
    })
}

/// Orientation stats operate on the per-sample rotation angle in degrees
/// (`2 * acos(|w|)`), a scalar summary that stays comparable across runs.
fn orientation_stats(series: &SegmentSeries) -> Option<ChannelStats> {
    if series.orientation.is_empty() {
        return None;
    }
    let angles: Vec<f64> = series
        .orientation
        .iter()
        .map(|r| 2.0 * r.qw.abs().clamp(0.0, 1.0).acos().to_degrees())
        .collect();
    ChannelStats::from_samples(&angles)
}

fn joint_extrema(series: &SegmentSeries) -> Option<JointExtrema> {
    if series.joints.is_empty() {
        return None;
    }
    let mut min = [f64::INFINITY; 6];
    let mut max = [f64::NEG_INFINITY; 6];
    for row in &series.joints {
        for i in 0..6 {
            min[i] = min[i].min(row.joints[i]);
            max[i] = max[i].max(row.joints[i]);
        }
    }
    for i in 0..6 {
        min[i] = round3(min[i]);
        max[i] = round3(max[i]);
    }
    Some(JointExtrema { min, max })
}

// ---------------------------------------------------------------------------
// Movement-type classification
// ---------------------------------------------------------------------------

/// Classify a position track as linear ("l"), circular ("c"), or
/// spline ("s").
///
/// Deterministic and geometric: works on a <= 20-sample downsample,
/// measures chord deviation, then attempts a circle fit from sampled
/// point triples.
pub fn classify_movement(track: &[Vec<f64>]) -> &'static str {
    let track = if track.len() > CLASSIFY_SAMPLES {
        resample(track, CLASSIFY_SAMPLES)
    } else {
        track.to_vec()
    };
    let n = track.len();
    if n < 4 {
        return "l";
    }

    let start = &track[0];
    let last = &track[n - 1];
    let main: Vec<f64> = last.iter().zip(start).map(|(b, a)| b - a).collect();
    let main_len = main.iter().map(|v| v * v).sum::<f64>().sqrt();
    if main_len < EPS {
        return "l";
    }
    let unit: Vec<f64> = main.iter().map(|v| v / main_len).collect();

    // Maximum perpendicular deviation of evenly spaced interior points.
    let mut max_dev: f64 = 0.0;
    for k in 0..DEVIATION_PROBES {
        let t = (k + 1) as f64 / (DEVIATION_PROBES + 1) as f64;
        let idx = ((t * (n - 1) as f64).round() as usize).min(n - 1);
        let p = &track[idx];
        let rel: Vec<f64> = p.iter().zip(start).map(|(b, a)| b - a).collect();
        let along: f64 = rel.iter().zip(&unit).map(|(r, u)| r * u).sum();
        let perp_sq: f64 = rel
            .iter()
            .zip(&unit)
            .map(|(r, u)| {
                let d = r - along * u;
                d * d
            })
            .sum();
        max_dev = max_dev.max(perp_sq.sqrt());
    }
    let deviation_ratio = max_dev / main_len;
    if deviation_ratio < LINEAR_RATIO {
        return "l";
    }

    // Circle fit from point triples (p_i, p_{i+k}, p_{i+2k}).
    let step = ((n - 1) / 4).max(1);
    let mut radii = Vec::new();
    let mut total_angle_deg = 0.0;
    let mut sampled = 0;
    let mut i = 0;
    while i + 2 * step < n && sampled < MAX_TRIPLES {
        let (p0, p1, p2) = (&track[i], &track[i + step], &track[i + 2 * step]);
        let v1: Vec<f64> = p1.iter().zip(p0).map(|(b, a)| b - a).collect();
        let v2: Vec<f64> = p2.iter().zip(p1).map(|(b, a)| b - a).collect();
        let n1 = v1.iter().map(|v| v * v).sum::<f64>().sqrt();
        let n2 = v2.iter().map(|v| v * v).sum::<f64>().sqrt();
        if n1 > EPS && n2 > EPS {
            let cosine =
                (v1.iter().zip(&v2).map(|(a, b)| a * b).sum::<f64>() / (n1 * n2)).clamp(-1.0, 1.0);
            let angle = cosine.acos();
            total_angle_deg += angle.to_degrees();
            if angle > EPS {
                let chord = euclidean(p0, p2);
                let radius = chord / (2.0 * (angle / 2.0).sin());
                if radius <= MAX_RADIUS {
                    radii.push(radius);
                }
            }
        }
        sampled += 1;
        i += 1;
    }

    if radii.len() >= 2 && total_angle_deg > MIN_TOTAL_ANGLE_DEG {
        let mean = radii.iter().sum::<f64>() / radii.len() as f64;
        let var = radii.iter().map(|r| (r - mean) * (r - mean)).sum::<f64>() / radii.len() as f64;
        if mean > EPS && var.sqrt() / mean < RADIUS_CV_LIMIT {
            return "c";
        }
    }

    if deviation_ratio > SPLINE_RATIO {
        "s"
    } else if deviation_ratio > CIRCULAR_RATIO {
        "c"
    } else {
        "l"
    }
}

// ---------------------------------------------------------------------------
// Movement-type string similarity
// ---------------------------------------------------------------------------

/// Similarity of two movement-type strings in `[0, 1]`.
///
/// `0.6 * (1 - |len(a)-len(b)| / max_len) + 0.4 * prefix_matches / max_len`;
/// identical strings score exactly 1.0. Symmetric in its arguments.
pub fn movement_type_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let (la, lb) = (a.chars().count(), b.chars().count());
    let max_len = la.max(lb) as f64;
    let len_score = 1.0 - (la.abs_diff(lb)) as f64 / max_len;
    let matches = a.chars().zip(b.chars()).filter(|(x, y)| x == y).count();
    0.6 * len_score + 0.4 * matches as f64 / max_len
}

/// Round to 3 decimal places, the precision of every stored statistic.
pub fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{AccelRow, PositionRow, TwistRow};

    fn line_track(n: usize, to: [f64; 3]) -> Vec<Vec<f64>> {
        (0..n)
            .map(|i| {
                let t = i as f64 / (n - 1) as f64;
                vec![to[0] * t, to[1] * t, to[2] * t]
            })
            .collect()
    }

    fn arc_track(n: usize, radius: f64, sweep_deg: f64) -> Vec<Vec<f64>> {
        (0..n)
            .map(|i| {
                let theta = (i as f64 / (n - 1) as f64) * sweep_deg.to_radians();
                vec![radius * theta.cos(), radius * theta.sin(), 0.0]
            })
            .collect()
    }

    fn position_series(track: &[Vec<f64>]) -> SegmentSeries {
        SegmentSeries {
            position: track
                .iter()
                .enumerate()
                .map(|(i, p)| PositionRow {
                    bahn_id: "1719230000".into(),
                    segment_id: "1719230000_1".into(),
                    timestamp: i as i64 * 1_000_000,
                    x: p[0],
                    y: p[1],
                    z: p[2],
                })
                .collect(),
            ..Default::default()
        }
    }

    // -- Classification ------------------------------------------------------

    #[test]
    fn straight_line_classifies_linear() {
        assert_eq!(classify_movement(&line_track(100, [1000.0, 0.0, 0.0])), "l");
    }

    #[test]
    fn quarter_arc_classifies_circular() {
        assert_eq!(classify_movement(&arc_track(100, 500.0, 90.0)), "c");
    }

    #[test]
    fn tiny_track_defaults_to_linear() {
        assert_eq!(classify_movement(&line_track(3, [1.0, 0.0, 0.0])), "l");
    }

    #[test]
    fn degenerate_chord_defaults_to_linear() {
        // Closed loop: start == end.
        let track = arc_track(50, 100.0, 360.0);
        assert_eq!(classify_movement(&track), "l");
    }

    // -- Segment metadata ----------------------------------------------------

    #[test]
    fn linear_segment_has_unit_direction_and_length() {
        let series = position_series(&line_track(100, [1000.0, 0.0, 0.0]));
        let meta = compute_segment_metadata("1719230000", "1719230000_1", &series, Some(2.5))
            .expect("metadata");
        assert_eq!(meta.length, Some(1000.0));
        assert_eq!(meta.direction, Some([1.0, 0.0, 0.0]));
        assert_eq!(meta.movement_type.as_deref(), Some("l"));
        assert_eq!(meta.weight, Some(2.5));
        assert!(meta.duration.unwrap() >= 0.0);
        // Channels without samples stay null.
        assert!(meta.twist.is_none());
        assert!(meta.joints.is_none());
    }

    #[test]
    fn empty_series_yields_no_record() {
        let series = SegmentSeries::default();
        assert!(compute_segment_metadata("b", "b_1", &series, None).is_none());
    }

    #[test]
    fn duration_comes_from_nanosecond_span() {
        let mut series = position_series(&line_track(2, [1.0, 0.0, 0.0]));
        series.position[0].timestamp = 0;
        series.position[1].timestamp = 2_500_000_000;
        let meta = compute_segment_metadata("b", "b_1", &series, None).unwrap();
        assert_eq!(meta.duration, Some(2.5));
    }

    #[test]
    fn twist_and_accel_stats_round_to_three_decimals() {
        let mut series = position_series(&line_track(4, [1.0, 0.0, 0.0]));
        series.twist = vec![
            TwistRow {
                bahn_id: "b".into(),
                segment_id: "b_1".into(),
                timestamp: 0,
                tcp_speed: 1.23456,
            },
            TwistRow {
                bahn_id: "b".into(),
                segment_id: "b_1".into(),
                timestamp: 1,
                tcp_speed: 2.34567,
            },
        ];
        series.accel = vec![AccelRow {
            bahn_id: "b".into(),
            segment_id: "b_1".into(),
            timestamp: 0,
            tcp_accel: 9.87654,
        }];
        let meta = compute_segment_metadata("b", "b_1", &series, None).unwrap();
        let twist = meta.twist.unwrap();
        assert_eq!(twist.min, 1.235);
        assert_eq!(twist.max, 2.346);
        assert_eq!(twist.mean, twist.median);
        assert_eq!(meta.acceleration.unwrap().std, 0.0);
    }

    // -- Aggregate -----------------------------------------------------------

    #[test]
    fn aggregate_concatenates_first_characters_and_sums_length() {
        let s1 = compute_segment_metadata(
            "b",
            "b_1",
            &position_series(&line_track(50, [100.0, 0.0, 0.0])),
            None,
        )
        .unwrap();
        let s2 = compute_segment_metadata(
            "b",
            "b_2",
            &position_series(&arc_track(100, 500.0, 90.0)),
            None,
        )
        .unwrap();

        let whole = position_series(&line_track(60, [700.0, 0.0, 0.0]));
        let agg = aggregate_bahn_metadata("b", &[s1.clone(), s2.clone()], &whole, None).unwrap();

        assert_eq!(agg.segment_id, "b");
        assert_eq!(agg.movement_type.as_deref(), Some("lc"));
        let expected = s1.length.unwrap() + s2.length.unwrap();
        assert!((agg.length.unwrap() - expected).abs() < 1e-9);
    }

    // -- String similarity ---------------------------------------------------

    #[test]
    fn identical_strings_score_one() {
        assert_eq!(movement_type_similarity("ll", "ll"), 1.0);
    }

    #[test]
    fn ll_vs_lc_scores_below_threshold() {
        // Same length (len score 1.0), one of two prefix chars matches:
        // 0.6 * 1.0 + 0.4 * 0.5 = 0.8, below the 0.9 prefilter threshold.
        let score = movement_type_similarity("ll", "lc");
        assert!((score - 0.8).abs() < 1e-9);
        assert!(score < 0.9);
    }

    #[test]
    fn similarity_is_symmetric() {
        for (a, b) in [("l", "lc"), ("lls", "lc"), ("ccc", "c"), ("s", "lls")] {
            assert_eq!(
                movement_type_similarity(a, b),
                movement_type_similarity(b, a)
            );
        }
    }

    #[test]
    fn empty_string_scores_zero() {
        assert_eq!(movement_type_similarity("", "l"), 0.0);
    }
}
