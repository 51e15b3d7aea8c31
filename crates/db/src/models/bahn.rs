//! Entity models for the `bewegungsdaten.bahn_info` table and the raw
//! per-channel tables.
//!
//! Channel rows mirror the closed record structs in `bahn_core::channels`;
//! the database structs exist so `FromRow` derives stay in this crate and
//! the core crate keeps no sqlx dependency.

use bahn_core::channels::{AccelRow, JointRow, OrientationRow, PositionRow, TwistRow};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Bahn info
// ---------------------------------------------------------------------------

/// A row from `bahn_info`, one per recorded Bahn.
///
/// `start_time` and `end_time` are integer nanoseconds since the epoch, the
/// same clock the channel rows carry. Frequencies are derived at ingest
/// (samples per second over the recording span) and may be null for
/// channels the recording did not carry.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BahnInfo {
    pub bahn_id: String,
    pub record_filename: String,
    pub robot_model: Option<String>,
    pub bahnplanung: Option<String>,
    pub recording_date: Option<String>,
    pub start_time: i64,
    pub end_time: i64,
    pub number_of_segments: i32,
    pub frequency_position: Option<f64>,
    pub frequency_orientation: Option<f64>,
    pub frequency_twist: Option<f64>,
    pub frequency_accel: Option<f64>,
    pub frequency_joint: Option<f64>,
    pub calibration_run: bool,
    pub pick_and_place_run: bool,
    pub weight: Option<f64>,
    pub velocity_handling: Option<f64>,
    pub stop_point_tolerance: Option<f64>,
    pub wait_time: Option<f64>,
    /// Verbatim payload of the recording's `# transformation_matrix:`
    /// comment, if the file carried one.
    pub transformation_matrix: Option<String>,
}

// ---------------------------------------------------------------------------
// Raw channel rows
// ---------------------------------------------------------------------------

/// A row from `bahn_position_soll`.
#[derive(Debug, Clone, FromRow)]
pub struct DbPositionRow {
    pub bahn_id: String,
    pub segment_id: String,
    pub timestamp: i64,
    pub x_soll: f64,
    pub y_soll: f64,
    pub z_soll: f64,
}

impl From<DbPositionRow> for PositionRow {
    fn from(r: DbPositionRow) -> Self {
        PositionRow {
            bahn_id: r.bahn_id,
            segment_id: r.segment_id,
            timestamp: r.timestamp,
            x: r.x_soll,
            y: r.y_soll,
            z: r.z_soll,
        }
    }
}

/// A row from `bahn_orientation_soll`.
#[derive(Debug, Clone, FromRow)]
pub struct DbOrientationRow {
    pub bahn_id: String,
    pub segment_id: String,
    pub timestamp: i64,
    pub qx_soll: f64,
    pub qy_soll: f64,
    pub qz_soll: f64,
    pub qw_soll: f64,
}

impl From<DbOrientationRow> for OrientationRow {
    fn from(r: DbOrientationRow) -> Self {
        OrientationRow {
            bahn_id: r.bahn_id,
            segment_id: r.segment_id,
            timestamp: r.timestamp,
            qx: r.qx_soll,
            qy: r.qy_soll,
            qz: r.qz_soll,
            qw: r.qw_soll,
        }
    }
}

/// A row from `bahn_twist_ist`.
#[derive(Debug, Clone, FromRow)]
pub struct DbTwistRow {
    pub bahn_id: String,
    pub segment_id: String,
    pub timestamp: i64,
    pub tcp_speed_ist: f64,
}

impl From<DbTwistRow> for TwistRow {
    fn from(r: DbTwistRow) -> Self {
        TwistRow {
            bahn_id: r.bahn_id,
            segment_id: r.segment_id,
            timestamp: r.timestamp,
            tcp_speed: r.tcp_speed_ist,
        }
    }
}

/// A row from `bahn_accel_ist`.
#[derive(Debug, Clone, FromRow)]
pub struct DbAccelRow {
    pub bahn_id: String,
    pub segment_id: String,
    pub timestamp: i64,
    pub tcp_accel_ist: f64,
}

impl From<DbAccelRow> for AccelRow {
    fn from(r: DbAccelRow) -> Self {
        AccelRow {
            bahn_id: r.bahn_id,
            segment_id: r.segment_id,
            timestamp: r.timestamp,
            tcp_accel: r.tcp_accel_ist,
        }
    }
}

/// A row from `bahn_joint_states`.
#[derive(Debug, Clone, FromRow)]
pub struct DbJointRow {
    pub bahn_id: String,
    pub segment_id: String,
    pub timestamp: i64,
    pub joint_1: f64,
    pub joint_2: f64,
    pub joint_3: f64,
    pub joint_4: f64,
    pub joint_5: f64,
    pub joint_6: f64,
}

impl From<DbJointRow> for JointRow {
    fn from(r: DbJointRow) -> Self {
        JointRow {
            bahn_id: r.bahn_id,
            segment_id: r.segment_id,
            timestamp: r.timestamp,
            joints: [
                r.joint_1, r.joint_2, r.joint_3, r.joint_4, r.joint_5, r.joint_6,
            ],
        }
    }
}

