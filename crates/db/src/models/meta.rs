//! Flat row model for the `bewegungsdaten.bahn_meta` table and its
//! conversions to and from the nested [`SegmentMetadata`] record.
//!
//! The table stores one row per segment plus one whole-Bahn aggregate row
//! (`segment_id = bahn_id`). Statistic groups the recording did not carry
//! stay null column-wise; a group round-trips to `Some` only when every
//! column in it is present.

use bahn_core::metadata::{ChannelStats, JointExtrema, PositionStats, SegmentMetadata};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row of `bahn_meta`, columns flattened for runtime queries.
#[derive(Debug, Clone, Default, FromRow, Serialize, Deserialize)]
pub struct BahnMetaRow {
    pub bahn_id: String,
    pub segment_id: String,
    pub duration: Option<f64>,
    pub weight: Option<f64>,
    pub length: Option<f64>,
    pub movement_type: Option<String>,
    pub direction_x: Option<f64>,
    pub direction_y: Option<f64>,
    pub direction_z: Option<f64>,

    pub min_position_x: Option<f64>,
    pub max_position_x: Option<f64>,
    pub mean_position_x: Option<f64>,
    pub median_position_x: Option<f64>,
    pub std_position_x: Option<f64>,
    pub min_position_y: Option<f64>,
    pub max_position_y: Option<f64>,
    pub mean_position_y: Option<f64>,
    pub median_position_y: Option<f64>,
    pub std_position_y: Option<f64>,
    pub min_position_z: Option<f64>,
    pub max_position_z: Option<f64>,
    pub mean_position_z: Option<f64>,
    pub median_position_z: Option<f64>,
    pub std_position_z: Option<f64>,
    pub first_position_x: Option<f64>,
    pub first_position_y: Option<f64>,
    pub first_position_z: Option<f64>,
    pub last_position_x: Option<f64>,
    pub last_position_y: Option<f64>,
    pub last_position_z: Option<f64>,

    pub min_orientation: Option<f64>,
    pub max_orientation: Option<f64>,
    pub mean_orientation: Option<f64>,
    pub median_orientation: Option<f64>,
    pub std_orientation: Option<f64>,

    pub min_twist: Option<f64>,
    pub max_twist: Option<f64>,
    pub mean_twist: Option<f64>,
    pub median_twist: Option<f64>,
    pub std_twist: Option<f64>,

    pub min_acceleration: Option<f64>,
    pub max_acceleration: Option<f64>,
    pub mean_acceleration: Option<f64>,
    pub median_acceleration: Option<f64>,
    pub std_acceleration: Option<f64>,

    pub min_joint_1: Option<f64>,
    pub min_joint_2: Option<f64>,
    pub min_joint_3: Option<f64>,
    pub min_joint_4: Option<f64>,
    pub min_joint_5: Option<f64>,
    pub min_joint_6: Option<f64>,
    pub max_joint_1: Option<f64>,
    pub max_joint_2: Option<f64>,
    pub max_joint_3: Option<f64>,
    pub max_joint_4: Option<f64>,
    pub max_joint_5: Option<f64>,
    pub max_joint_6: Option<f64>,
}

impl BahnMetaRow {
    /// Flatten a derived metadata record for storage.
    pub fn from_metadata(meta: &SegmentMetadata) -> Self {
        let mut row = BahnMetaRow {
            bahn_id: meta.bahn_id.clone(),
            segment_id: meta.segment_id.clone(),
            duration: meta.duration,
            weight: meta.weight,
            length: meta.length,
            movement_type: meta.movement_type.clone(),
            ..Default::default()
        };
        if let Some(d) = meta.direction {
            row.direction_x = Some(d[0]);
            row.direction_y = Some(d[1]);
            row.direction_z = Some(d[2]);
        }
        if let Some(p) = &meta.position {
            fill_stats(
                &p.x,
                &mut row.min_position_x,
                &mut row.max_position_x,
                &mut row.mean_position_x,
                &mut row.median_position_x,
                &mut row.std_position_x,
            );
            fill_stats(
                &p.y,
                &mut row.min_position_y,
                &mut row.max_position_y,
                &mut row.mean_position_y,
                &mut row.median_position_y,
                &mut row.std_position_y,
            );
            fill_stats(
                &p.z,
                &mut row.min_position_z,
                &mut row.max_position_z,
                &mut row.mean_position_z,
                &mut row.median_position_z,
                &mut row.std_position_z,
            );
            row.first_position_x = Some(p.first[0]);
            row.first_position_y = Some(p.first[1]);
            row.first_position_z = Some(p.first[2]);
            row.last_position_x = Some(p.last[0]);
            row.last_position_y = Some(p.last[1]);
            row.last_position_z = Some(p.last[2]);
        }
        if let Some(o) = &meta.orientation {
            fill_stats(
                o,
                &mut row.min_orientation,
                &mut row.max_orientation,
                &mut row.mean_orientation,
                &mut row.median_orientation,
                &mut row.std_orientation,
            );
        }
        if let Some(t) = &meta.twist {
            fill_stats(
                t,
                &mut row.min_twist,
                &mut row.max_twist,
                &mut row.mean_twist,
                &mut row.median_twist,
                &mut row.std_twist,
            );
        }
        if let Some(a) = &meta.acceleration {
            fill_stats(
                a,
                &mut row.min_acceleration,
                &mut row.max_acceleration,
                &mut row.mean_acceleration,
                &mut row.median_acceleration,
                &mut row.std_acceleration,
            );
        }
        if let Some(j) = &meta.joints {
            row.min_joint_1 = Some(j.min[0]);
            row.min_joint_2 = Some(j.min[1]);
            row.min_joint_3 = Some(j.min[2]);
            row.min_joint_4 = Some(j.min[3]);
            row.min_joint_5 = Some(j.min[4]);
            row.min_joint_6 = Some(j.min[5]);
            row.max_joint_1 = Some(j.max[0]);
            row.max_joint_2 = Some(j.max[1]);
            row.max_joint_3 = Some(j.max[2]);
            row.max_joint_4 = Some(j.max[3]);
            row.max_joint_5 = Some(j.max[4]);
            row.max_joint_6 = Some(j.max[5]);
        }
        row
    }

    /// Reassemble the nested record. Partial stat groups (possible only if
    /// the row was written by something other than this crate) collapse
    /// to `None`.
    pub fn into_metadata(self) -> SegmentMetadata {
        let direction = match (self.direction_x, self.direction_y, self.direction_z) {
            (Some(x), Some(y), Some(z)) => Some([x, y, z]),
            _ => None,
        };

        let position = (|| {
            Some(PositionStats {
                x: read_stats(
                    self.min_position_x,
                    self.max_position_x,
                    self.mean_position_x,
                    self.median_position_x,
                    self.std_position_x,
                )?,
                y: read_stats(
                    self.min_position_y,
                    self.max_position_y,
                    self.mean_position_y,
                    self.median_position_y,
                    self.std_position_y,
                )?,
                z: read_stats(
                    self.min_position_z,
                    self.max_position_z,
                    self.mean_position_z,
                    self.median_position_z,
                    self.std_position_z,
                )?,
                first: [
                    self.first_position_x?,
                    self.first_position_y?,
                    self.first_position_z?,
                ],
                last: [
                    self.last_position_x?,
                    self.last_position_y?,
                    self.last_position_z?,
                ],
            })
        })();

        let orientation = read_stats(
            self.min_orientation,
            self.max_orientation,
            self.mean_orientation,
            self.median_orientation,
            self.std_orientation,
        );
        let twist = read_stats(
            self.min_twist,
            self.max_twist,
            self.mean_twist,
            self.median_twist,
            self.std_twist,
        );
        let acceleration = read_stats(
            self.min_acceleration,
            self.max_acceleration,
            self.mean_acceleration,
            self.median_acceleration,
            self.std_acceleration,
        );

        let joints = (|| {
            Some(JointExtrema {
                min: [
                    self.min_joint_1?,
                    self.min_joint_2?,
                    self.min_joint_3?,
                    self.min_joint_4?,
                    self.min_joint_5?,
                    self.min_joint_6?,
                ],
                max: [
                    self.max_joint_1?,
                    self.max_joint_2?,
                    self.max_joint_3?,
                    self.max_joint_4?,
                    self.max_joint_5?,
                    self.max_joint_6?,
                ],
            })
        })();

        SegmentMetadata {
            bahn_id: self.bahn_id,
            segment_id: self.segment_id,
            duration: self.duration,
            weight: self.weight,
            length: self.length,
            direction,
            movement_type: self.movement_type,
            position,
            orientation,
            twist,
            acceleration,
            joints,
        }
    }
}

fn fill_stats(
    stats: &ChannelStats,
    min: &mut Option<f64>,
    max: &mut Option<f64>,
    mean: &mut Option<f64>,
    median: &mut Option<f64>,
    std: &mut Option<f64>,
) {
    *min = Some(stats.min);
    *max = Some(stats.max);
    *mean = Some(stats.mean);
    *median = Some(stats.median);
    *std = Some(stats.std);
}

fn read_stats(
    min: Option<f64>,
    max: Option<f64>,
    mean: Option<f64>,
    median: Option<f64>,
    std: Option<f64>,
) -> Option<ChannelStats> {
    Some(ChannelStats {
        min: min?,
        max: max?,
        mean: mean?,
        median: median?,
        std: std?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bahn_core::channels::{PositionRow, SegmentSeries};
    use bahn_core::metadata::compute_segment_metadata;

    fn sample_metadata() -> SegmentMetadata {
        let series = SegmentSeries {
            position: (0..50)
                .map(|i| PositionRow {
                    bahn_id: "1719230000".into(),
                    segment_id: "1719230000_1".into(),
                    timestamp: i as i64 * 4_000_000,
                    x: i as f64 * 10.0,
                    y: 500.0,
                    z: 120.0 + i as f64,
                })
                .collect(),
            ..Default::default()
        };
        compute_segment_metadata("1719230000", "1719230000_1", &series, Some(1.5)).unwrap()
    }

    #[test]
    fn metadata_round_trips_through_flat_row() {
        let meta = sample_metadata();
        let row = BahnMetaRow::from_metadata(&meta);
        assert_eq!(row.segment_id, "1719230000_1");
        assert_eq!(row.movement_type.as_deref(), Some("l"));
        assert!(row.min_twist.is_none());

        let back = row.into_metadata();
        assert_eq!(back, meta);
    }

    #[test]
    fn partial_stat_group_collapses_to_none() {
        let meta = sample_metadata();
        let mut row = BahnMetaRow::from_metadata(&meta);
        row.std_position_z = None;
        let back = row.into_metadata();
        assert!(back.position.is_none());
        // Untouched groups keep their values.
        assert_eq!(back.length, meta.length);
    }
}
