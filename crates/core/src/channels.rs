//! Closed row records for the raw per-channel tables.
//!
//! The recorder emits heterogeneous key/value rows; here every channel is a
//! fixed struct whose fields line up with the positional column lists used
//! by the bulk-copy path. Timestamps are integer nanoseconds and order rows
//! within a segment.

use serde::{Deserialize, Serialize};

/// Cartesian setpoint position sample (mm).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRow {
    pub bahn_id: String,
    pub segment_id: String,
    pub timestamp: i64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Orientation setpoint sample, quaternion in `(x, y, z, w)` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrientationRow {
    pub bahn_id: String,
    pub segment_id: String,
    pub timestamp: i64,
    pub qx: f64,
    pub qy: f64,
    pub qz: f64,
    pub qw: f64,
}

/// Measured TCP speed sample (mm/s).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwistRow {
    pub bahn_id: String,
    pub segment_id: String,
    pub timestamp: i64,
    pub tcp_speed: f64,
}

/// Measured TCP acceleration sample (mm/s^2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccelRow {
    pub bahn_id: String,
    pub segment_id: String,
    pub timestamp: i64,
    pub tcp_accel: f64,
}

/// Joint-state sample, six axis angles (deg).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointRow {
    pub bahn_id: String,
    pub segment_id: String,
    pub timestamp: i64,
    pub joints: [f64; 6],
}

/// Reached-pose event emitted at an AP point (position + quaternion).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRow {
    pub bahn_id: String,
    pub segment_id: String,
    pub timestamp: i64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub qx: f64,
    pub qy: f64,
    pub qz: f64,
    pub qw: f64,
}

/// All raw channels of one segment (or of a whole Bahn when assembled from
/// every segment), gathered for metadata and embedding computation.
#[derive(Debug, Clone, Default)]
pub struct SegmentSeries {
    pub position: Vec<PositionRow>,
    pub orientation: Vec<OrientationRow>,
    pub twist: Vec<TwistRow>,
    pub accel: Vec<AccelRow>,
    pub joints: Vec<JointRow>,
}

impl SegmentSeries {
    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
            && self.orientation.is_empty()
            && self.twist.is_empty()
            && self.accel.is_empty()
            && self.joints.is_empty()
    }

    /// Earliest and latest timestamp across all channels, if any samples
    /// exist at all.
    pub fn timestamp_span(&self) -> Option<(i64, i64)> {
        let mut min = i64::MAX;
        let mut max = i64::MIN;
        let mut any = false;

        let mut scan = |ts: i64| {
            any = true;
            min = min.min(ts);
            max = max.max(ts);
        };
        self.position.iter().for_each(|r| scan(r.timestamp));
        self.orientation.iter().for_each(|r| scan(r.timestamp));
        self.twist.iter().for_each(|r| scan(r.timestamp));
        self.accel.iter().for_each(|r| scan(r.timestamp));
        self.joints.iter().for_each(|r| scan(r.timestamp));

        any.then_some((min, max))
    }

    /// Position track as `(n x 3)` rows, in timestamp order.
    pub fn position_track(&self) -> Vec<Vec<f64>> {
        self.position.iter().map(|r| vec![r.x, r.y, r.z]).collect()
    }

    /// Joint track as `(n x 6)` rows.
    pub fn joint_track(&self) -> Vec<Vec<f64>> {
        self.joints.iter().map(|r| r.joints.to_vec()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_span_covers_all_channels() {
        let series = SegmentSeries {
            position: vec![PositionRow {
                bahn_id: "b".into(),
                segment_id: "b_1".into(),
                timestamp: 100,
                x: 0.0,
                y: 0.0,
                z: 0.0,
            }],
            twist: vec![TwistRow {
                bahn_id: "b".into(),
                segment_id: "b_1".into(),
                timestamp: 900,
                tcp_speed: 1.0,
            }],
            ..Default::default()
        };
        assert_eq!(series.timestamp_span(), Some((100, 900)));
    }

    #[test]
    fn timestamp_span_of_empty_series_is_none() {
        assert_eq!(SegmentSeries::default().timestamp_span(), None);
    }
}
