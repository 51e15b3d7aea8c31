//! Feature-tolerance prefilter over the derived metadata table.
//!
//! Numeric features become B-tree range predicates executed by the
//! metadata repository; the movement-type feature cannot be expressed as
//! a range, so its string similarity is scored here on the returned rows.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use bahn_core::metadata::movement_type_similarity;
use bahn_core::types::SearchScope;
use bahn_db::models::meta::BahnMetaRow;
use bahn_db::repositories::meta_repo::{MetaRepo, MetaWindows};

use crate::error::SearchError;

/// Default relative tolerance for numeric features.
pub const DEFAULT_TOLERANCE: f64 = 0.10;

/// Half-width of the representative-position box (mm).
const POSITION_BOX_MM: f64 = 200.0;

/// Minimum movement-type similarity for a candidate to survive.
const MOVEMENT_TYPE_THRESHOLD: f64 = 0.9;

/// Filterable metadata features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterFeature {
    Duration,
    Length,
    MovementType,
    VelocityProfile,
    AccelerationProfile,
    Position3d,
}

/// Candidate-id prefilter over segment metadata.
pub struct FilterSearcher;

impl FilterSearcher {
    /// Candidate segment ids whose metadata lies within tolerance of the
    /// target's, excluding the target itself.
    ///
    /// Exact movement-type matches order before merely similar ones; the
    /// remaining order is segment-id ascending. An empty feature set
    /// returns every id in scope except the target. Features the target
    /// has no value for are skipped.
    pub async fn filter(
        pool: &PgPool,
        target_id: &str,
        features: &[FilterFeature],
        tolerance: f64,
        scope: SearchScope,
    ) -> Result<Vec<String>, SearchError> {
        let mut windows = MetaWindows {
            aggregates_only: match scope {
                SearchScope::Bahn => Some(true),
                SearchScope::Segment => Some(false),
                SearchScope::Any => None,
            },
            exclude_segment_id: Some(target_id.to_string()),
            ..Default::default()
        };

        let target = if features.is_empty() {
            None
        } else {
            let row = MetaRepo::fetch(pool, target_id)
                .await?
                .ok_or_else(|| bahn_core::CoreError::segment_not_found(target_id))?;
            build_windows(&mut windows, &row, features, tolerance);
            Some(row)
        };

        let rows = MetaRepo::filter_candidates(pool, &windows).await?;

        let wants_movement = features.contains(&FilterFeature::MovementType);
        let target_movement = target
            .as_ref()
            .and_then(|t| t.movement_type.clone())
            .filter(|_| wants_movement);

        let ids = match target_movement {
            // Missing target movement type skips the feature.
            None => rows.into_iter().map(|r| r.segment_id).collect(),
            Some(target_mt) => {
                let mut exact = Vec::new();
                let mut similar = Vec::new();
                for row in rows {
                    let Some(mt) = &row.movement_type else {
                        continue;
                    };
                    if *mt == target_mt {
                        exact.push(row.segment_id);
                    } else if movement_type_similarity(mt, &target_mt)
                        >= MOVEMENT_TYPE_THRESHOLD
                    {
                        similar.push(row.segment_id);
                    }
                }
                exact.extend(similar);
                exact
            }
        };

        tracing::debug!(
            target = target_id,
            features = features.len(),
            candidates = ids.len(),
            "prefilter complete"
        );
        Ok(ids)
    }
}

fn build_windows(
    windows: &mut MetaWindows,
    target: &BahnMetaRow,
    features: &[FilterFeature],
    tolerance: f64,
) {
    for feature in features {
        match feature {
            FilterFeature::Duration => {
                windows.duration = target.duration.map(|v| relative_window(v, tolerance));
            }
            FilterFeature::Length => {
                windows.length = target.length.map(|v| relative_window(v, tolerance));
            }
            FilterFeature::Position3d => {
                windows.mean_position_x =
                    target.mean_position_x.map(|v| (v - POSITION_BOX_MM, v + POSITION_BOX_MM));
                windows.mean_position_y =
                    target.mean_position_y.map(|v| (v - POSITION_BOX_MM, v + POSITION_BOX_MM));
                windows.mean_position_z =
                    target.mean_position_z.map(|v| (v - POSITION_BOX_MM, v + POSITION_BOX_MM));
            }
            FilterFeature::VelocityProfile => {
                // Absolute window derived from the target's peak value,
                // applied to every statistic of the channel.
                if let Some(peak) = target.max_twist {
                    let half = (peak * tolerance).abs();
                    windows.min_twist = target.min_twist.map(|v| (v - half, v + half));
                    windows.max_twist = target.max_twist.map(|v| (v - half, v + half));
                    windows.mean_twist = target.mean_twist.map(|v| (v - half, v + half));
                    windows.std_twist = target.std_twist.map(|v| (v - half, v + half));
                }
            }
            FilterFeature::AccelerationProfile => {
                if let Some(peak) = target.max_acceleration {
                    let half = (peak * tolerance).abs();
                    windows.min_acceleration =
                        target.min_acceleration.map(|v| (v - half, v + half));
                    windows.max_acceleration =
                        target.max_acceleration.map(|v| (v - half, v + half));
                    windows.mean_acceleration =
                        target.mean_acceleration.map(|v| (v - half, v + half));
                    windows.std_acceleration =
                        target.std_acceleration.map(|v| (v - half, v + half));
                }
            }
            // Scored in Rust after the SQL pass.
            FilterFeature::MovementType => {}
        }
    }
}

/// `[v·(1−tol), v·(1+tol)]`, with the bounds swapped for negative values
/// so the window stays a valid range.
fn relative_window(value: f64, tolerance: f64) -> (f64, f64) {
    let a = value * (1.0 - tolerance);
    let b = value * (1.0 + tolerance);
    (a.min(b), a.max(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_window_brackets_positive_values() {
        assert_eq!(relative_window(100.0, 0.1), (90.0, 110.0));
    }

    #[test]
    fn relative_window_stays_ordered_for_negative_values() {
        let (lo, hi) = relative_window(-100.0, 0.1);
        assert!(lo < hi);
        assert_eq!((lo, hi), (-110.0, -90.0));
    }

    #[test]
    fn profile_window_requires_peak_value() {
        let target = BahnMetaRow {
            mean_twist: Some(50.0),
            ..Default::default()
        };
        let mut windows = MetaWindows::default();
        build_windows(
            &mut windows,
            &target,
            &[FilterFeature::VelocityProfile],
            0.1,
        );
        // No max_twist on the target, so the feature is skipped outright.
        assert!(windows.mean_twist.is_none());
    }

    #[test]
    fn position_feature_builds_fixed_boxes() {
        let target = BahnMetaRow {
            mean_position_x: Some(1000.0),
            mean_position_y: Some(-500.0),
            mean_position_z: Some(120.0),
            ..Default::default()
        };
        let mut windows = MetaWindows::default();
        build_windows(&mut windows, &target, &[FilterFeature::Position3d], 0.1);
        assert_eq!(windows.mean_position_x, Some((800.0, 1200.0)));
        assert_eq!(windows.mean_position_y, Some((-700.0, -300.0)));
        assert_eq!(windows.mean_position_z, Some((-80.0, 320.0)));
    }
}
