//! Repository for `bahn_info` and the raw per-channel tables.
//!
//! Reads assemble the closed channel records from `bahn_core::channels`;
//! writes of the channel tables themselves go through the bulk-copy path
//! in [`crate::repositories::copy`].

use std::collections::HashSet;

use sqlx::{PgConnection, PgPool};

use bahn_core::channels::SegmentSeries;
use bahn_core::types::is_aggregate;

use crate::models::bahn::{
    BahnInfo, DbAccelRow, DbJointRow, DbOrientationRow, DbPositionRow, DbTwistRow,
};

const BAHN_INFO_COLUMNS: &str = "bahn_id, record_filename, robot_model, bahnplanung, \
     recording_date, start_time, end_time, \
     number_of_segments, frequency_position, frequency_orientation, frequency_twist, \
     frequency_accel, frequency_joint, calibration_run, pick_and_place_run, weight, \
     velocity_handling, stop_point_tolerance, wait_time, transformation_matrix";

/// Provides Bahn-level lookups and raw-channel reads.
pub struct BahnRepo;

impl BahnRepo {
    // -----------------------------------------------------------------------
    // Bahn info
    // -----------------------------------------------------------------------

    /// All Bahn ids already present, used by ingestion to skip duplicates.
    pub async fn existing_bahn_ids(pool: &PgPool) -> Result<HashSet<String>, sqlx::Error> {
        let ids: Vec<(String,)> =
            sqlx::query_as("SELECT bahn_id FROM bewegungsdaten.bahn_info")
                .fetch_all(pool)
                .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    pub async fn fetch_bahn_info(
        pool: &PgPool,
        bahn_id: &str,
    ) -> Result<Option<BahnInfo>, sqlx::Error> {
        let query = format!(
            "SELECT {BAHN_INFO_COLUMNS} FROM bewegungsdaten.bahn_info WHERE bahn_id = $1"
        );
        sqlx::query_as::<_, BahnInfo>(&query)
            .bind(bahn_id)
            .fetch_optional(pool)
            .await
    }

    /// Insert one `bahn_info` row inside an ingestion transaction.
    pub async fn insert_bahn_info(
        conn: &mut PgConnection,
        info: &BahnInfo,
    ) -> Result<(), sqlx::Error> {
        let query = format!(
            "INSERT INTO bewegungsdaten.bahn_info ({BAHN_INFO_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
                     $18, $19, $20)"
        );
        sqlx::query(&query)
            .bind(&info.bahn_id)
            .bind(&info.record_filename)
            .bind(&info.robot_model)
            .bind(&info.bahnplanung)
            .bind(&info.recording_date)
            .bind(info.start_time)
            .bind(info.end_time)
            .bind(info.number_of_segments)
            .bind(info.frequency_position)
            .bind(info.frequency_orientation)
            .bind(info.frequency_twist)
            .bind(info.frequency_accel)
            .bind(info.frequency_joint)
            .bind(info.calibration_run)
            .bind(info.pick_and_place_run)
            .bind(info.weight)
            .bind(info.velocity_handling)
            .bind(info.stop_point_tolerance)
            .bind(info.wait_time)
            .bind(&info.transformation_matrix)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Remove a Bahn and every dependent row, channel tables first.
    pub async fn delete_bahn(conn: &mut PgConnection, bahn_id: &str) -> Result<(), sqlx::Error> {
        for table in [
            "bahn_position_soll",
            "bahn_orientation_soll",
            "bahn_twist_ist",
            "bahn_accel_ist",
            "bahn_joint_states",
            "bahn_events",
            "bahn_embeddings",
            "bahn_meta",
            "bahn_info",
        ] {
            let query = format!("DELETE FROM bewegungsdaten.{table} WHERE bahn_id = $1");
            sqlx::query(&query).bind(bahn_id).execute(&mut *conn).await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Raw channel reads
    // -----------------------------------------------------------------------

    /// Distinct proper segment ids of one Bahn, in numeric segment order.
    ///
    /// The position channel is authoritative for segment membership; the
    /// whole-Bahn aggregate id is not included.
    pub async fn segment_ids(pool: &PgPool, bahn_id: &str) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT segment_id FROM bewegungsdaten.bahn_position_soll \
             WHERE bahn_id = $1 AND segment_id <> bahn_id \
             ORDER BY segment_id",
        )
        .bind(bahn_id)
        .fetch_all(pool)
        .await?;

        let mut ids: Vec<String> = rows.into_iter().map(|(id,)| id).collect();
        // "ORDER BY segment_id" sorts lexicographically; segment numbers
        // past 9 need a numeric sort on the suffix.
        ids.sort_by_key(|id| {
            id.rsplit('_')
                .next()
                .and_then(|n| n.parse::<u64>().ok())
                .unwrap_or(u64::MAX)
        });
        Ok(ids)
    }

    /// Load every raw channel of one segment, ordered by timestamp.
    ///
    /// When `segment_id` names the whole-Bahn aggregate the rows of all
    /// segments are returned instead.
    pub async fn fetch_segment_series(
        pool: &PgPool,
        segment_id: &str,
    ) -> Result<SegmentSeries, sqlx::Error> {
        let bahn_id = bahn_core::types::bahn_id_of(segment_id);
        let (key_column, key) = if is_aggregate(bahn_id, segment_id) {
            ("bahn_id", bahn_id)
        } else {
            ("segment_id", segment_id)
        };

        let position = sqlx::query_as::<_, DbPositionRow>(&format!(
            "SELECT bahn_id, segment_id, timestamp, x_soll, y_soll, z_soll \
             FROM bewegungsdaten.bahn_position_soll WHERE {key_column} = $1 ORDER BY timestamp"
        ))
        .bind(key)
        .fetch_all(pool)
        .await?;

        let orientation = sqlx::query_as::<_, DbOrientationRow>(&format!(
            "SELECT bahn_id, segment_id, timestamp, qx_soll, qy_soll, qz_soll, qw_soll \
             FROM bewegungsdaten.bahn_orientation_soll WHERE {key_column} = $1 ORDER BY timestamp"
        ))
        .bind(key)
        .fetch_all(pool)
        .await?;

        let twist = sqlx::query_as::<_, DbTwistRow>(&format!(
            "SELECT bahn_id, segment_id, timestamp, tcp_speed_ist \
             FROM bewegungsdaten.bahn_twist_ist WHERE {key_column} = $1 ORDER BY timestamp"
        ))
        .bind(key)
        .fetch_all(pool)
        .await?;

        let accel = sqlx::query_as::<_, DbAccelRow>(&format!(
            "SELECT bahn_id, segment_id, timestamp, tcp_accel_ist \
             FROM bewegungsdaten.bahn_accel_ist WHERE {key_column} = $1 ORDER BY timestamp"
        ))
        .bind(key)
        .fetch_all(pool)
        .await?;

        let joints = sqlx::query_as::<_, DbJointRow>(&format!(
            "SELECT bahn_id, segment_id, timestamp, \
                    joint_1, joint_2, joint_3, joint_4, joint_5, joint_6 \
             FROM bewegungsdaten.bahn_joint_states WHERE {key_column} = $1 ORDER BY timestamp"
        ))
        .bind(key)
        .fetch_all(pool)
        .await?;

        Ok(SegmentSeries {
            position: position.into_iter().map(Into::into).collect(),
            orientation: orientation.into_iter().map(Into::into).collect(),
            twist: twist.into_iter().map(Into::into).collect(),
            accel: accel.into_iter().map(Into::into).collect(),
            joints: joints.into_iter().map(Into::into).collect(),
        })
    }
}
