//! Repository for the derived `bahn_meta` table.
//!
//! One row per segment plus the whole-Bahn aggregate row. The feature
//! prefilter runs here as plain B-tree range predicates; the non-SQL part
//! of the filter (movement-type string scoring) happens in the search
//! crate on the returned rows.

use sqlx::{PgConnection, PgPool};

use crate::models::meta::BahnMetaRow;

const META_COLUMNS: &str = "bahn_id, segment_id, duration, weight, length, movement_type, \
     direction_x, direction_y, direction_z, \
     min_position_x, max_position_x, mean_position_x, median_position_x, std_position_x, \
     min_position_y, max_position_y, mean_position_y, median_position_y, std_position_y, \
     min_position_z, max_position_z, mean_position_z, median_position_z, std_position_z, \
     first_position_x, first_position_y, first_position_z, \
     last_position_x, last_position_y, last_position_z, \
     min_orientation, max_orientation, mean_orientation, median_orientation, std_orientation, \
     min_twist, max_twist, mean_twist, median_twist, std_twist, \
     min_acceleration, max_acceleration, mean_acceleration, median_acceleration, \
     std_acceleration, \
     min_joint_1, min_joint_2, min_joint_3, min_joint_4, min_joint_5, min_joint_6, \
     max_joint_1, max_joint_2, max_joint_3, max_joint_4, max_joint_5, max_joint_6";

/// Numeric range windows for the metadata prefilter. `None` skips the
/// predicate entirely; every bound is inclusive.
#[derive(Debug, Clone, Default)]
pub struct MetaWindows {
    /// `true` keeps only whole-Bahn aggregate rows, `false` only proper
    /// segments, `None` both.
    pub aggregates_only: Option<bool>,
    /// Segment id excluded from the result (the query itself).
    pub exclude_segment_id: Option<String>,
    pub duration: Option<(f64, f64)>,
    pub weight: Option<(f64, f64)>,
    pub length: Option<(f64, f64)>,
    pub mean_position_x: Option<(f64, f64)>,
    pub mean_position_y: Option<(f64, f64)>,
    pub mean_position_z: Option<(f64, f64)>,
    pub min_twist: Option<(f64, f64)>,
    pub max_twist: Option<(f64, f64)>,
    pub mean_twist: Option<(f64, f64)>,
    pub std_twist: Option<(f64, f64)>,
    pub min_acceleration: Option<(f64, f64)>,
    pub max_acceleration: Option<(f64, f64)>,
    pub mean_acceleration: Option<(f64, f64)>,
    pub std_acceleration: Option<(f64, f64)>,
}

impl MetaWindows {
    fn is_unconstrained(&self) -> bool {
        self.duration.is_none()
            && self.weight.is_none()
            && self.length.is_none()
            && self.mean_position_x.is_none()
            && self.mean_position_y.is_none()
            && self.mean_position_z.is_none()
            && self.min_twist.is_none()
            && self.max_twist.is_none()
            && self.mean_twist.is_none()
            && self.std_twist.is_none()
            && self.min_acceleration.is_none()
            && self.max_acceleration.is_none()
            && self.mean_acceleration.is_none()
            && self.std_acceleration.is_none()
    }
}

/// Provides upsert and range-filtered reads over `bahn_meta`.
pub struct MetaRepo;

impl MetaRepo {
    /// Insert or refresh one metadata row, keyed by segment id.
    pub async fn upsert(conn: &mut PgConnection, row: &BahnMetaRow) -> Result<(), sqlx::Error> {
        let placeholders: Vec<String> = (1..=57).map(|i| format!("${i}")).collect();
        let updates: Vec<String> = META_COLUMNS
            .split(',')
            .map(|c| c.trim())
            .filter(|c| *c != "bahn_id" && *c != "segment_id")
            .map(|c| format!("{c} = EXCLUDED.{c}"))
            .collect();
        let query = format!(
            "INSERT INTO bewegungsdaten.bahn_meta ({META_COLUMNS}) VALUES ({}) \
             ON CONFLICT (segment_id) DO UPDATE SET {}",
            placeholders.join(", "),
            updates.join(", "),
        );

        sqlx::query(&query)
            .bind(&row.bahn_id)
            .bind(&row.segment_id)
            .bind(row.duration)
            .bind(row.weight)
            .bind(row.length)
            .bind(&row.movement_type)
            .bind(row.direction_x)
            .bind(row.direction_y)
            .bind(row.direction_z)
            .bind(row.min_position_x)
            .bind(row.max_position_x)
            .bind(row.mean_position_x)
            .bind(row.median_position_x)
            .bind(row.std_position_x)
            .bind(row.min_position_y)
            .bind(row.max_position_y)
            .bind(row.mean_position_y)
            .bind(row.median_position_y)
            .bind(row.std_position_y)
            .bind(row.min_position_z)
            .bind(row.max_position_z)
            .bind(row.mean_position_z)
            .bind(row.median_position_z)
            .bind(row.std_position_z)
            .bind(row.first_position_x)
            .bind(row.first_position_y)
            .bind(row.first_position_z)
            .bind(row.last_position_x)
            .bind(row.last_position_y)
            .bind(row.last_position_z)
            .bind(row.min_orientation)
            .bind(row.max_orientation)
            .bind(row.mean_orientation)
            .bind(row.median_orientation)
            .bind(row.std_orientation)
            .bind(row.min_twist)
            .bind(row.max_twist)
            .bind(row.mean_twist)
            .bind(row.median_twist)
            .bind(row.std_twist)
            .bind(row.min_acceleration)
            .bind(row.max_acceleration)
            .bind(row.mean_acceleration)
            .bind(row.median_acceleration)
            .bind(row.std_acceleration)
            .bind(row.min_joint_1)
            .bind(row.min_joint_2)
            .bind(row.min_joint_3)
            .bind(row.min_joint_4)
            .bind(row.min_joint_5)
            .bind(row.min_joint_6)
            .bind(row.max_joint_1)
            .bind(row.max_joint_2)
            .bind(row.max_joint_3)
            .bind(row.max_joint_4)
            .bind(row.max_joint_5)
            .bind(row.max_joint_6)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn fetch(
        pool: &PgPool,
        segment_id: &str,
    ) -> Result<Option<BahnMetaRow>, sqlx::Error> {
        let query =
            format!("SELECT {META_COLUMNS} FROM bewegungsdaten.bahn_meta WHERE segment_id = $1");
        sqlx::query_as::<_, BahnMetaRow>(&query)
            .bind(segment_id)
            .fetch_optional(pool)
            .await
    }

    /// All metadata rows of one Bahn including the aggregate row.
    pub async fn fetch_for_bahn(
        pool: &PgPool,
        bahn_id: &str,
    ) -> Result<Vec<BahnMetaRow>, sqlx::Error> {
        let query = format!(
            "SELECT {META_COLUMNS} FROM bewegungsdaten.bahn_meta \
             WHERE bahn_id = $1 ORDER BY segment_id"
        );
        sqlx::query_as::<_, BahnMetaRow>(&query)
            .bind(bahn_id)
            .fetch_all(pool)
            .await
    }

    /// Rows whose statistics fall inside every given window.
    ///
    /// Window predicates require the column to be non-null, so rows
    /// missing a constrained feature are filtered out; with no windows at
    /// all the scope/exclusion predicates still apply.
    pub async fn filter_candidates(
        pool: &PgPool,
        windows: &MetaWindows,
    ) -> Result<Vec<BahnMetaRow>, sqlx::Error> {
        let mut conditions: Vec<String> = Vec::new();
        let mut numeric_binds: Vec<f64> = Vec::new();
        let mut next = 1;

        if let Some(aggregates) = windows.aggregates_only {
            conditions.push(if aggregates {
                "segment_id = bahn_id".into()
            } else {
                "segment_id <> bahn_id".into()
            });
        }
        if windows.exclude_segment_id.is_some() {
            conditions.push(format!("segment_id <> ${next}"));
            next += 1;
        }

        // The exclusion id binds first, numeric pairs follow in this
        // fixed column order.
        let ranged: [(&str, Option<(f64, f64)>); 14] = [
            ("duration", windows.duration),
            ("weight", windows.weight),
            ("length", windows.length),
            ("mean_position_x", windows.mean_position_x),
            ("mean_position_y", windows.mean_position_y),
            ("mean_position_z", windows.mean_position_z),
            ("min_twist", windows.min_twist),
            ("max_twist", windows.max_twist),
            ("mean_twist", windows.mean_twist),
            ("std_twist", windows.std_twist),
            ("min_acceleration", windows.min_acceleration),
            ("max_acceleration", windows.max_acceleration),
            ("mean_acceleration", windows.mean_acceleration),
            ("std_acceleration", windows.std_acceleration),
        ];
        for (column, range) in ranged {
            if let Some((lo, hi)) = range {
                conditions.push(format!("{column} BETWEEN ${next} AND ${}", next + 1));
                numeric_binds.push(lo);
                numeric_binds.push(hi);
                next += 2;
            }
        }
        debug_assert!(windows.is_unconstrained() == numeric_binds.is_empty());

        let mut query = format!("SELECT {META_COLUMNS} FROM bewegungsdaten.bahn_meta");
        if !conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conditions.join(" AND "));
        }
        query.push_str(" ORDER BY segment_id");

        let mut q = sqlx::query_as::<_, BahnMetaRow>(&query);
        if let Some(exclude) = &windows.exclude_segment_id {
            q = q.bind(exclude);
        }
        for value in numeric_binds {
            q = q.bind(value);
        }
        let rows = q.fetch_all(pool).await?;
        tracing::debug!(
            conditions = conditions.len(),
            survivors = rows.len(),
            "metadata prefilter executed"
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_list_matches_placeholder_count() {
        assert_eq!(META_COLUMNS.split(',').count(), 57);
    }

    #[test]
    fn empty_windows_are_unconstrained() {
        assert!(MetaWindows::default().is_unconstrained());
        let windows = MetaWindows {
            duration: Some((1.0, 2.0)),
            ..Default::default()
        };
        assert!(!windows.is_unconstrained());
    }
}
