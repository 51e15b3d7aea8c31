//! Deterministic fixed-dimensional embedding vectors.
//!
//! All time-series modes share one shape: preprocess, resample to a fixed
//! sample count, flatten row-major, L2-normalize, narrow to f32. A channel
//! with fewer than [`MIN_SAMPLES`] raw samples yields no embedding (null in
//! the store) rather than a padded guess. The metadata mode is derived from
//! the statistics record instead of a raw series.

use serde::{Deserialize, Serialize};

use crate::channels::SegmentSeries;
use crate::metadata::SegmentMetadata;
use crate::signal::{gradient_unit_time, quat_to_rotvec, resample, savgol_smooth, unit_f32};
use crate::types::EmbeddingMode;

/// Minimum raw samples for a time-series embedding.
pub const MIN_SAMPLES: usize = 10;

/// Length normalization constant for the metadata embedding (mm).
const META_LENGTH_SCALE: f64 = 9000.0;
/// Duration normalization constant (s).
const META_DURATION_SCALE: f64 = 25.0;
/// Twist range half-width (mm/s): values map through `(v + 3100) / 6200`.
const META_TWIST_HALF: f64 = 3100.0;
/// Acceleration range half-width (mm/s^2).
const META_ACCEL_HALF: f64 = 10200.0;

/// The five embedding vectors of one segment (or whole-Bahn aggregate).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentEmbeddings {
    pub bahn_id: String,
    pub segment_id: String,
    pub joint: Option<Vec<f32>>,
    pub position: Option<Vec<f32>>,
    pub orientation: Option<Vec<f32>>,
    pub velocity: Option<Vec<f32>>,
    pub metadata: Option<Vec<f32>>,
    /// Raw position sample count the vectors were derived from.
    pub sample_count: i32,
}

impl SegmentEmbeddings {
    pub fn vector(&self, mode: EmbeddingMode) -> Option<&Vec<f32>> {
        match mode {
            EmbeddingMode::Joint => self.joint.as_ref(),
            EmbeddingMode::Position => self.position.as_ref(),
            EmbeddingMode::Orientation => self.orientation.as_ref(),
            EmbeddingMode::Velocity => self.velocity.as_ref(),
            EmbeddingMode::Metadata => self.metadata.as_ref(),
        }
    }

    pub fn all_null(&self) -> bool {
        EmbeddingMode::ALL.iter().all(|m| self.vector(*m).is_none())
    }
}

/// Compute every embedding mode for one segment.
pub fn compute_embeddings(
    bahn_id: &str,
    segment_id: &str,
    series: &SegmentSeries,
    metadata: Option<&SegmentMetadata>,
) -> SegmentEmbeddings {
    SegmentEmbeddings {
        bahn_id: bahn_id.to_string(),
        segment_id: segment_id.to_string(),
        joint: joint_embedding(series),
        position: position_embedding(series),
        orientation: orientation_embedding(series),
        velocity: velocity_embedding(series),
        metadata: metadata.and_then(metadata_embedding),
        sample_count: series.position.len() as i32,
    }
}

/// Joint mode: the raw six-axis track, resampled to 10 samples (60-D).
pub fn joint_embedding(series: &SegmentSeries) -> Option<Vec<f32>> {
    let track = series.joint_track();
    if track.len() < MIN_SAMPLES {
        return None;
    }
    unit_f32(&resample(&track, 10))
}

/// Position mode: translate to the first sample, scale by the maximum
/// displacement norm, resample to 10 samples (30-D).
pub fn position_embedding(series: &SegmentSeries) -> Option<Vec<f32>> {
    let track = series.position_track();
    if track.len() < MIN_SAMPLES {
        return None;
    }
    let centered = center_on_first(&track);
    let max_norm = centered
        .iter()
        .map(|p| p.iter().map(|v| v * v).sum::<f64>().sqrt())
        .fold(0.0_f64, f64::max);
    let scaled: Vec<Vec<f64>> = if max_norm > f64::EPSILON {
        centered
            .iter()
            .map(|p| p.iter().map(|v| v / max_norm).collect())
            .collect()
    } else {
        centered
    };
    unit_f32(&resample(&scaled, 10))
}

/// Orientation mode: quaternions to rotation vectors, offset to the first
/// sample, resampled to 10 samples (30-D).
pub fn orientation_embedding(series: &SegmentSeries) -> Option<Vec<f32>> {
    if series.orientation.len() < MIN_SAMPLES {
        return None;
    }
    let rotvecs: Vec<Vec<f64>> = series
        .orientation
        .iter()
        .map(|r| quat_to_rotvec(r.qx, r.qy, r.qz, r.qw).to_vec())
        .collect();
    let centered = center_on_first(&rotvecs);
    unit_f32(&resample(&centered, 10))
}

/// Velocity mode: smooth the position track (order 3), differentiate
/// against unit time, smooth the velocity (order 2), resample to 9
/// samples (27-D).
pub fn velocity_embedding(series: &SegmentSeries) -> Option<Vec<f32>> {
    let track = series.position_track();
    if track.len() < MIN_SAMPLES {
        return None;
    }
    let smoothed = savgol_smooth(&track, 3);
    let velocity = gradient_unit_time(&smoothed);
    let velocity = savgol_smooth(&velocity, 2);
    unit_f32(&resample(&velocity, 9))
}

/// Metadata mode: 14 features from the statistics record, each clipped to
/// `[0, 1]` before the final L2 normalization.
///
/// Features: movement-string linear/circular ratios, scaled length and
/// duration, and the five twist / five acceleration statistics mapped
/// through their symmetric ranges.
pub fn metadata_embedding(meta: &SegmentMetadata) -> Option<Vec<f32>> {
    let movement = meta.movement_type.as_deref()?;
    let length = meta.length?;
    let duration = meta.duration?;
    let twist = meta.twist?;
    let accel = meta.acceleration?;

    let l_count = movement.chars().filter(|c| *c == 'l').count() as f64;
    let c_count = movement.chars().filter(|c| *c == 'c').count() as f64;
    let lc_total = l_count + c_count;
    let (linear_ratio, circular_ratio) = if lc_total > 0.0 {
        (l_count / lc_total, c_count / lc_total)
    } else {
        (0.0, 0.0)
    };

    let symmetric = |v: f64, half: f64| (v + half) / (2.0 * half);

    let mut features = vec![
        linear_ratio,
        circular_ratio,
        length / META_LENGTH_SCALE,
        duration / META_DURATION_SCALE,
        symmetric(twist.min, META_TWIST_HALF),
        symmetric(twist.max, META_TWIST_HALF),
        symmetric(twist.mean, META_TWIST_HALF),
        symmetric(twist.median, META_TWIST_HALF),
        twist.std / META_TWIST_HALF,
        symmetric(accel.min, META_ACCEL_HALF),
        symmetric(accel.max, META_ACCEL_HALF),
        symmetric(accel.mean, META_ACCEL_HALF),
        symmetric(accel.median, META_ACCEL_HALF),
        accel.std / META_ACCEL_HALF,
    ];
    for f in &mut features {
        *f = f.clamp(0.0, 1.0);
    }
    unit_f32(&[features])
}

fn center_on_first(track: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let Some(first) = track.first().cloned() else {
        return Vec::new();
    };
    track
        .iter()
        .map(|row| row.iter().zip(&first).map(|(v, f)| v - f).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{JointRow, OrientationRow, PositionRow};
    use crate::metadata::compute_segment_metadata;

    fn line_series(n: usize) -> SegmentSeries {
        SegmentSeries {
            position: (0..n)
                .map(|i| PositionRow {
                    bahn_id: "b".into(),
                    segment_id: "b_1".into(),
                    timestamp: i as i64 * 4_000_000,
                    x: i as f64 * 10.0,
                    y: 0.0,
                    z: 0.0,
                })
                .collect(),
            ..Default::default()
        }
    }

    fn assert_unit(v: &[f32]) {
        let norm: f64 = v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6, "norm was {norm}");
    }

    #[test]
    fn position_embedding_is_unit_and_30d() {
        let v = position_embedding(&line_series(100)).expect("embedding");
        assert_eq!(v.len(), EmbeddingMode::Position.dim());
        assert_unit(&v);
    }

    #[test]
    fn short_series_yields_no_embedding() {
        assert!(position_embedding(&line_series(9)).is_none());
        assert!(velocity_embedding(&line_series(9)).is_none());
    }

    #[test]
    fn position_embedding_is_translation_invariant() {
        let mut shifted = line_series(50);
        for row in &mut shifted.position {
            row.x += 500.0;
            row.y -= 120.0;
            row.z += 42.0;
        }
        let a = position_embedding(&line_series(50)).unwrap();
        let b = position_embedding(&shifted).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn velocity_embedding_is_unit_and_27d() {
        let v = velocity_embedding(&line_series(100)).expect("embedding");
        assert_eq!(v.len(), EmbeddingMode::Velocity.dim());
        assert_unit(&v);
    }

    #[test]
    fn joint_embedding_is_unit_and_60d() {
        let series = SegmentSeries {
            joints: (0..40)
                .map(|i| JointRow {
                    bahn_id: "b".into(),
                    segment_id: "b_1".into(),
                    timestamp: i,
                    joints: [
                        i as f64,
                        -i as f64,
                        0.5 * i as f64,
                        1.0,
                        2.0,
                        (i as f64).sin(),
                    ],
                })
                .collect(),
            ..Default::default()
        };
        let v = joint_embedding(&series).expect("embedding");
        assert_eq!(v.len(), EmbeddingMode::Joint.dim());
        assert_unit(&v);
    }

    #[test]
    fn orientation_embedding_is_unit_and_30d() {
        let series = SegmentSeries {
            orientation: (0..30)
                .map(|i| {
                    let half = (i as f64 * 0.01) / 2.0;
                    OrientationRow {
                        bahn_id: "b".into(),
                        segment_id: "b_1".into(),
                        timestamp: i,
                        qx: 0.0,
                        qy: 0.0,
                        qz: half.sin(),
                        qw: half.cos(),
                    }
                })
                .collect(),
            ..Default::default()
        };
        let v = orientation_embedding(&series).expect("embedding");
        assert_eq!(v.len(), EmbeddingMode::Orientation.dim());
        assert_unit(&v);
    }

    #[test]
    fn constant_position_track_yields_none() {
        // Centering turns a constant track into all zeros; the zero vector
        // is stored as null, never as a non-unit embedding.
        let mut series = line_series(20);
        for row in &mut series.position {
            row.x = 7.0;
        }
        assert!(position_embedding(&series).is_none());
    }

    #[test]
    fn metadata_embedding_is_unit_and_14d() {
        let mut series = line_series(50);
        series.twist = (0..50)
            .map(|i| crate::channels::TwistRow {
                bahn_id: "b".into(),
                segment_id: "b_1".into(),
                timestamp: i,
                tcp_speed: 100.0 + i as f64,
            })
            .collect();
        series.accel = (0..50)
            .map(|i| crate::channels::AccelRow {
                bahn_id: "b".into(),
                segment_id: "b_1".into(),
                timestamp: i,
                tcp_accel: -50.0 + i as f64,
            })
            .collect();
        let meta = compute_segment_metadata("b", "b_1", &series, None).unwrap();
        let v = metadata_embedding(&meta).expect("embedding");
        assert_eq!(v.len(), EmbeddingMode::Metadata.dim());
        assert_unit(&v);
    }

    #[test]
    fn metadata_embedding_requires_twist_and_accel_stats() {
        let series = line_series(50);
        let meta = compute_segment_metadata("b", "b_1", &series, None).unwrap();
        assert!(meta.twist.is_none());
        assert!(metadata_embedding(&meta).is_none());
    }

    #[test]
    fn compute_embeddings_fills_sample_count() {
        let series = line_series(42);
        let emb = compute_embeddings("b", "b_1", &series, None);
        assert_eq!(emb.sample_count, 42);
        assert!(emb.position.is_some());
        assert!(emb.metadata.is_none());
        assert!(!emb.all_null());
    }
}
