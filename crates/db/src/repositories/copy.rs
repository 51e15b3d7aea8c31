//! Bulk load of the raw channel tables via `COPY ... FROM STDIN`.
//!
//! Ingestion writes tens of thousands of rows per Bahn; row-at-a-time
//! inserts are far too slow for that, so each channel table gets one COPY
//! stream per Bahn bundle, all inside the caller's transaction. The
//! payload is CSV; every field is numeric or a timestamp-derived id, so
//! no quoting is needed.

use std::fmt::Write as _;

use sqlx::PgConnection;

use bahn_core::channels::{
    AccelRow, EventRow, JointRow, OrientationRow, PositionRow, TwistRow,
};

async fn copy_csv(
    conn: &mut PgConnection,
    table: &str,
    columns: &str,
    payload: String,
) -> Result<u64, sqlx::Error> {
    if payload.is_empty() {
        return Ok(0);
    }
    let statement = format!(
        "COPY bewegungsdaten.{table} ({columns}) FROM STDIN WITH (FORMAT csv)"
    );
    let mut stream = conn.copy_in_raw(&statement).await?;
    if let Err(err) = stream.send(payload.into_bytes()).await {
        // Abort the stream so the connection returns to a usable state
        // before the error propagates.
        let _ = stream.abort("copy payload send failed").await;
        return Err(err);
    }
    stream.finish().await
}

pub async fn copy_position_rows(
    conn: &mut PgConnection,
    rows: &[PositionRow],
) -> Result<u64, sqlx::Error> {
    let mut payload = String::new();
    for r in rows {
        let _ = writeln!(
            payload,
            "{},{},{},{},{},{}",
            r.bahn_id, r.segment_id, r.timestamp, r.x, r.y, r.z
        );
    }
    copy_csv(
        conn,
        "bahn_position_soll",
        "bahn_id, segment_id, timestamp, x_soll, y_soll, z_soll",
        payload,
    )
    .await
}

pub async fn copy_orientation_rows(
    conn: &mut PgConnection,
    rows: &[OrientationRow],
) -> Result<u64, sqlx::Error> {
    let mut payload = String::new();
    for r in rows {
        let _ = writeln!(
            payload,
            "{},{},{},{},{},{},{}",
            r.bahn_id, r.segment_id, r.timestamp, r.qx, r.qy, r.qz, r.qw
        );
    }
    copy_csv(
        conn,
        "bahn_orientation_soll",
        "bahn_id, segment_id, timestamp, qx_soll, qy_soll, qz_soll, qw_soll",
        payload,
    )
    .await
}

pub async fn copy_twist_rows(
    conn: &mut PgConnection,
    rows: &[TwistRow],
) -> Result<u64, sqlx::Error> {
    let mut payload = String::new();
    for r in rows {
        let _ = writeln!(
            payload,
            "{},{},{},{}",
            r.bahn_id, r.segment_id, r.timestamp, r.tcp_speed
        );
    }
    copy_csv(
        conn,
        "bahn_twist_ist",
        "bahn_id, segment_id, timestamp, tcp_speed_ist",
        payload,
    )
    .await
}

pub async fn copy_accel_rows(
    conn: &mut PgConnection,
    rows: &[AccelRow],
) -> Result<u64, sqlx::Error> {
    let mut payload = String::new();
    for r in rows {
        let _ = writeln!(
            payload,
            "{},{},{},{}",
            r.bahn_id, r.segment_id, r.timestamp, r.tcp_accel
        );
    }
    copy_csv(
        conn,
        "bahn_accel_ist",
        "bahn_id, segment_id, timestamp, tcp_accel_ist",
        payload,
    )
    .await
}

pub async fn copy_joint_rows(
    conn: &mut PgConnection,
    rows: &[JointRow],
) -> Result<u64, sqlx::Error> {
    let mut payload = String::new();
    for r in rows {
        let _ = writeln!(
            payload,
            "{},{},{},{},{},{},{},{},{}",
            r.bahn_id,
            r.segment_id,
            r.timestamp,
            r.joints[0],
            r.joints[1],
            r.joints[2],
            r.joints[3],
            r.joints[4],
            r.joints[5]
        );
    }
    copy_csv(
        conn,
        "bahn_joint_states",
        "bahn_id, segment_id, timestamp, joint_1, joint_2, joint_3, joint_4, joint_5, joint_6",
        payload,
    )
    .await
}

pub async fn copy_event_rows(
    conn: &mut PgConnection,
    rows: &[EventRow],
) -> Result<u64, sqlx::Error> {
    let mut payload = String::new();
    for r in rows {
        let _ = writeln!(
            payload,
            "{},{},{},{},{},{},{},{},{},{}",
            r.bahn_id, r.segment_id, r.timestamp, r.x, r.y, r.z, r.qx, r.qy, r.qz, r.qw
        );
    }
    copy_csv(
        conn,
        "bahn_events",
        "bahn_id, segment_id, timestamp, \
         x_reached, y_reached, z_reached, qx_reached, qy_reached, qz_reached, qw_reached",
        payload,
    )
    .await
}
