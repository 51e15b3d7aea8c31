//! Batch CSV ingestion: parse recordings, group raw segments into
//! Bahnen, bulk-load the raw channels, then derive metadata and
//! embeddings in a second pass.
//!
//! Each file is processed in isolation: a parse or grouping failure marks
//! that file's outcome and the batch continues. All database writes of
//! one file happen inside a single transaction, so a store error rolls
//! that file back completely.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use bahn_core::channels::{
    AccelRow, EventRow, JointRow, OrientationRow, PositionRow, SegmentSeries, TwistRow,
};
use bahn_core::metadata::{aggregate_bahn_metadata, compute_segment_metadata, round3};
use bahn_core::embedding::compute_embeddings;
use bahn_core::recording::{parse_recording, FileTags, RawRecord};
use bahn_core::segmentation::{group_segments, BahnGroup, RawSegmentSummary, SegmentationMethod};
use bahn_core::types::segment_id_for;
use bahn_core::CoreError;
use bahn_db::models::bahn::BahnInfo;
use bahn_db::models::meta::BahnMetaRow;
use bahn_db::repositories::{copy, BahnRepo, EmbeddingRepo, MetaRepo};

use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// Request / outcome shapes
// ---------------------------------------------------------------------------

/// One recording file handed to the ingestor.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestFile {
    pub filename: String,
    pub content: String,
}

/// Batch-level ingestion parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestParams {
    #[serde(default)]
    pub robot_model: Option<String>,
    #[serde(default)]
    pub bahnplanung: Option<String>,
    pub segmentation: SegmentationMethod,
    /// When false, files are parsed and grouped but nothing is written.
    #[serde(default = "default_persist")]
    pub persist: bool,
}

fn default_persist() -> bool {
    true
}

/// Outcome of one file.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Ingested {
        filename: String,
        bahn_ids: Vec<String>,
        segments_written: usize,
        rows_copied: u64,
    },
    /// Every Bahn the file produced already exists (or grouping produced
    /// none); nothing was written.
    Skipped { filename: String, reason: String },
    Failed { filename: String, error: String },
}

impl FileOutcome {
    pub fn filename(&self) -> &str {
        match self {
            FileOutcome::Ingested { filename, .. }
            | FileOutcome::Skipped { filename, .. }
            | FileOutcome::Failed { filename, .. } => filename,
        }
    }
}

/// Result of one ingestion batch.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub outcomes: Vec<FileOutcome>,
    pub processing_time_ms: u64,
}

// ---------------------------------------------------------------------------
// Ingestor
// ---------------------------------------------------------------------------

/// Drives the two-pass ingestion of recording files.
pub struct Ingestor;

impl Ingestor {
    /// Ingest a batch of files. Per-file failures never abort the batch.
    pub async fn ingest(
        pool: &PgPool,
        files: &[IngestFile],
        params: &IngestParams,
    ) -> Result<IngestReport, PipelineError> {
        params.segmentation.validate()?;
        let started = Instant::now();

        let mut existing = BahnRepo::existing_bahn_ids(pool).await?;

        let mut outcomes = Vec::with_capacity(files.len());
        for file in files {
            let outcome = match Self::ingest_file(pool, file, params, &existing).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!(file = %file.filename, error = %err, "file ingest failed");
                    FileOutcome::Failed {
                        filename: file.filename.clone(),
                        error: match err {
                            PipelineError::Core(core) => core.to_string(),
                            PipelineError::Db(_) => "store write failed".to_string(),
                        },
                    }
                }
            };
            // The same Bahn arriving again later in this batch dedupes
            // like one already stored before the batch started.
            note_ingested(&outcome, &mut existing);
            outcomes.push(outcome);
        }

        Ok(IngestReport {
            outcomes,
            processing_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn ingest_file(
        pool: &PgPool,
        file: &IngestFile,
        params: &IngestParams,
        existing: &HashSet<String>,
    ) -> Result<FileOutcome, PipelineError> {
        let recording = parse_recording(&file.content)?;
        let tags = FileTags::from_filename(&file.filename);

        let (summaries, by_raw_id) = collect_raw_segments(&recording.rows);
        if summaries.is_empty() {
            return Ok(FileOutcome::Skipped {
                filename: file.filename.clone(),
                reason: "no segmented rows in recording".into(),
            });
        }

        let groups = group_segments(&summaries, &params.segmentation)?;
        if groups.is_empty() {
            return Ok(FileOutcome::Skipped {
                filename: file.filename.clone(),
                reason: "segmentation produced no complete Bahn".into(),
            });
        }

        let mut bundles = Vec::new();
        let mut duplicates = 0usize;
        for group in &groups {
            if existing.contains(&group.bahn_id) {
                duplicates += 1;
                tracing::debug!(bahn = %group.bahn_id, "bahn already stored, skipping");
                continue;
            }
            bundles.push(build_bundle(group, &by_raw_id, &recording.transformation_matrix, &tags, file, params));
        }

        if bundles.is_empty() {
            return Ok(FileOutcome::Skipped {
                filename: file.filename.clone(),
                reason: format!("all {duplicates} grouped Bahnen already stored"),
            });
        }

        if !params.persist {
            return Ok(FileOutcome::Ingested {
                filename: file.filename.clone(),
                bahn_ids: bundles.iter().map(|b| b.info.bahn_id.clone()).collect(),
                segments_written: bundles.iter().map(|b| b.segments.len()).sum(),
                rows_copied: 0,
            });
        }

        // Pass 1: raw rows, one transaction per file, fixed table order.
        let mut tx = pool.begin().await?;
        let mut rows_copied = 0u64;
        for bundle in &bundles {
            BahnRepo::insert_bahn_info(&mut *tx, &bundle.info).await?;
            rows_copied += copy::copy_position_rows(&mut *tx, &bundle.position).await?;
            rows_copied += copy::copy_orientation_rows(&mut *tx, &bundle.orientation).await?;
            rows_copied += copy::copy_twist_rows(&mut *tx, &bundle.twist).await?;
            rows_copied += copy::copy_accel_rows(&mut *tx, &bundle.accel).await?;
            rows_copied += copy::copy_joint_rows(&mut *tx, &bundle.joints).await?;
            rows_copied += copy::copy_event_rows(&mut *tx, &bundle.events).await?;
        }
        tx.commit().await?;

        // Pass 2: derived metadata and embeddings, computed from the
        // in-memory series just written.
        let mut tx = pool.begin().await?;
        let mut segments_written = 0usize;
        for bundle in &bundles {
            segments_written += derive_and_store(&mut *tx, bundle).await?;
        }
        tx.commit().await?;

        tracing::info!(
            file = %file.filename,
            bahnen = bundles.len(),
            duplicates,
            rows = rows_copied,
            "file ingested"
        );
        Ok(FileOutcome::Ingested {
            filename: file.filename.clone(),
            bahn_ids: bundles.iter().map(|b| b.info.bahn_id.clone()).collect(),
            segments_written,
            rows_copied,
        })
    }
}

// ---------------------------------------------------------------------------
// Raw-segment collection
// ---------------------------------------------------------------------------

/// Group rows by raw segment id, in order of first appearance. The
/// measured (ist) stream id wins over the setpoint id when both are set.
fn collect_raw_segments(
    rows: &[RawRecord],
) -> (Vec<RawSegmentSummary>, HashMap<String, Vec<&RawRecord>>) {
    let mut order: Vec<String> = Vec::new();
    let mut by_raw_id: HashMap<String, Vec<&RawRecord>> = HashMap::new();

    for row in rows {
        let Some(raw_id) = row.segment_id_ist.as_ref().or(row.segment_id_soll.as_ref()) else {
            continue;
        };
        if !by_raw_id.contains_key(raw_id) {
            order.push(raw_id.clone());
        }
        by_raw_id.entry(raw_id.clone()).or_default().push(row);
    }

    let summaries = order
        .iter()
        .map(|raw_id| {
            let rows = &by_raw_id[raw_id];
            RawSegmentSummary {
                raw_id: raw_id.clone(),
                first_timestamp: rows.iter().map(|r| r.timestamp).min().unwrap_or(i64::MAX),
                endpoint: rows.iter().rev().find_map(|r| r.ap_position),
            }
        })
        .collect();
    (summaries, by_raw_id)
}

// ---------------------------------------------------------------------------
// Bundle materialization
// ---------------------------------------------------------------------------

/// Everything of one new Bahn, ready to write: the info row and the
/// channel rows with final segment ids.
struct BahnBundle {
    info: BahnInfo,
    /// Final segment ids, in segment order 1..k.
    segments: Vec<String>,
    position: Vec<PositionRow>,
    orientation: Vec<OrientationRow>,
    twist: Vec<TwistRow>,
    accel: Vec<AccelRow>,
    joints: Vec<JointRow>,
    events: Vec<EventRow>,
}

fn build_bundle(
    group: &BahnGroup,
    by_raw_id: &HashMap<String, Vec<&RawRecord>>,
    transformation_matrix: &Option<String>,
    tags: &FileTags,
    file: &IngestFile,
    params: &IngestParams,
) -> BahnBundle {
    let bahn_id = &group.bahn_id;
    let mut bundle = BahnBundle {
        info: BahnInfo {
            bahn_id: bahn_id.clone(),
            record_filename: file.filename.clone(),
            robot_model: params.robot_model.clone(),
            bahnplanung: params.bahnplanung.clone(),
            recording_date: None,
            start_time: i64::MAX,
            end_time: i64::MIN,
            number_of_segments: group.raw_ids.len() as i32,
            frequency_position: None,
            frequency_orientation: None,
            frequency_twist: None,
            frequency_accel: None,
            frequency_joint: None,
            calibration_run: tags.calibration_run,
            pick_and_place_run: tags.pick_and_place_run,
            weight: tags.weight_kg,
            velocity_handling: tags.velocity,
            stop_point_tolerance: tags.stop_point_tolerance,
            wait_time: tags.wait_time_s,
            transformation_matrix: transformation_matrix.clone(),
        },
        segments: Vec::with_capacity(group.raw_ids.len()),
        position: Vec::new(),
        orientation: Vec::new(),
        twist: Vec::new(),
        accel: Vec::new(),
        joints: Vec::new(),
        events: Vec::new(),
    };

    for (n, raw_id) in group.raw_ids.iter().enumerate() {
        let segment_id = segment_id_for(bahn_id, n + 1);
        bundle.segments.push(segment_id.clone());
        let Some(rows) = by_raw_id.get(raw_id) else {
            continue;
        };
        for row in rows {
            bundle.info.start_time = bundle.info.start_time.min(row.timestamp);
            bundle.info.end_time = bundle.info.end_time.max(row.timestamp);

            if let Some([x, y, z]) = row.position {
                bundle.position.push(PositionRow {
                    bahn_id: bahn_id.clone(),
                    segment_id: segment_id.clone(),
                    timestamp: row.timestamp,
                    x,
                    y,
                    z,
                });
            }
            if let Some([qx, qy, qz, qw]) = row.orientation {
                bundle.orientation.push(OrientationRow {
                    bahn_id: bahn_id.clone(),
                    segment_id: segment_id.clone(),
                    timestamp: row.timestamp,
                    qx,
                    qy,
                    qz,
                    qw,
                });
            }
            if let Some(tcp_speed) = row.tcp_speed {
                bundle.twist.push(TwistRow {
                    bahn_id: bahn_id.clone(),
                    segment_id: segment_id.clone(),
                    timestamp: row.timestamp,
                    tcp_speed,
                });
            }
            if let Some(tcp_accel) = row.tcp_accel {
                bundle.accel.push(AccelRow {
                    bahn_id: bahn_id.clone(),
                    segment_id: segment_id.clone(),
                    timestamp: row.timestamp,
                    tcp_accel,
                });
            }
            if let Some(joints) = row.joints {
                bundle.joints.push(JointRow {
                    bahn_id: bahn_id.clone(),
                    segment_id: segment_id.clone(),
                    timestamp: row.timestamp,
                    joints,
                });
            }
            if let (Some([x, y, z]), Some([qx, qy, qz, qw])) = (row.ap_position, row.ap_orientation)
            {
                bundle.events.push(EventRow {
                    bahn_id: bahn_id.clone(),
                    segment_id: segment_id.clone(),
                    timestamp: row.timestamp,
                    x,
                    y,
                    z,
                    qx,
                    qy,
                    qz,
                    qw,
                });
            }
        }
    }

    let span_s = (bundle.info.end_time - bundle.info.start_time).max(0) as f64 / 1e9;
    if span_s > 0.0 {
        let freq = |count: usize| (count > 0).then(|| round3(count as f64 / span_s));
        bundle.info.frequency_position = freq(bundle.position.len());
        bundle.info.frequency_orientation = freq(bundle.orientation.len());
        bundle.info.frequency_twist = freq(bundle.twist.len());
        bundle.info.frequency_accel = freq(bundle.accel.len());
        bundle.info.frequency_joint = freq(bundle.joints.len());
    }
    bundle.info.recording_date = recording_date(bundle.info.start_time);

    bundle
}

/// Record freshly written Bahn ids so later files in the batch skip them.
fn note_ingested(outcome: &FileOutcome, existing: &mut HashSet<String>) {
    if let FileOutcome::Ingested { bahn_ids, .. } = outcome {
        existing.extend(bahn_ids.iter().cloned());
    }
}

/// ISO date of an integer-nanosecond timestamp, when representable.
fn recording_date(start_time_ns: i64) -> Option<String> {
    if start_time_ns == i64::MAX {
        return None;
    }
    chrono::DateTime::from_timestamp(start_time_ns / 1_000_000_000, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
}

// ---------------------------------------------------------------------------
// Second pass: metadata + embeddings
// ---------------------------------------------------------------------------

/// Per-segment series for one id, narrowed out of the bundle's rows.
fn segment_series(bundle: &BahnBundle, segment_id: &str) -> SegmentSeries {
    let keep = |id: &str| id == segment_id;
    SegmentSeries {
        position: bundle.position.iter().filter(|r| keep(&r.segment_id)).cloned().collect(),
        orientation: bundle.orientation.iter().filter(|r| keep(&r.segment_id)).cloned().collect(),
        twist: bundle.twist.iter().filter(|r| keep(&r.segment_id)).cloned().collect(),
        accel: bundle.accel.iter().filter(|r| keep(&r.segment_id)).cloned().collect(),
        joints: bundle.joints.iter().filter(|r| keep(&r.segment_id)).cloned().collect(),
    }
}

async fn derive_and_store(
    conn: &mut sqlx::PgConnection,
    bundle: &BahnBundle,
) -> Result<usize, PipelineError> {
    let bahn_id = &bundle.info.bahn_id;
    let weight = bundle.info.weight;

    let mut segment_metas = Vec::new();
    let mut written = 0usize;
    for segment_id in &bundle.segments {
        let series = segment_series(bundle, segment_id);
        let Some(meta) = compute_segment_metadata(bahn_id, segment_id, &series, weight) else {
            continue;
        };
        MetaRepo::upsert(conn, &BahnMetaRow::from_metadata(&meta)).await?;
        let embeddings = compute_embeddings(bahn_id, segment_id, &series, Some(&meta));
        if !embeddings.all_null() {
            EmbeddingRepo::upsert(conn, &embeddings).await?;
        }
        segment_metas.push(meta);
        written += 1;
    }

    // Whole-Bahn aggregate row (segment_id = bahn_id).
    let whole = SegmentSeries {
        position: bundle.position.clone(),
        orientation: bundle.orientation.clone(),
        twist: bundle.twist.clone(),
        accel: bundle.accel.clone(),
        joints: bundle.joints.clone(),
    };
    if let Some(meta) = aggregate_bahn_metadata(bahn_id, &segment_metas, &whole, weight) {
        MetaRepo::upsert(conn, &BahnMetaRow::from_metadata(&meta)).await?;
        let embeddings = compute_embeddings(bahn_id, bahn_id, &whole, Some(&meta));
        if !embeddings.all_null() {
            EmbeddingRepo::upsert(conn, &embeddings).await?;
        }
        written += 1;
    } else {
        return Err(CoreError::DataAbsent(format!(
            "bahn {bahn_id} grouped without any channel samples"
        ))
        .into());
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(ts: i64, raw_id: &str, x: f64) -> RawRecord {
        RawRecord {
            timestamp: ts,
            segment_id_ist: Some(raw_id.to_string()),
            position: Some([x, 0.0, 0.0]),
            ..Default::default()
        }
    }

    #[test]
    fn raw_segments_keep_first_appearance_order() {
        let rows = vec![row(100, "s1", 0.0), row(200, "s2", 1.0), row(150, "s1", 0.5)];
        let (summaries, by_raw_id) = collect_raw_segments(&rows);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].raw_id, "s1");
        assert_eq!(summaries[0].first_timestamp, 100);
        assert_eq!(by_raw_id["s1"].len(), 2);
    }

    #[test]
    fn actual_stream_id_wins_over_setpoint() {
        let mut r = row(100, "ist_1", 0.0);
        r.segment_id_soll = Some("soll_1".to_string());
        let (summaries, _) = collect_raw_segments(&[r]);
        assert_eq!(summaries[0].raw_id, "ist_1");
    }

    #[test]
    fn rows_without_segment_id_are_dropped() {
        let mut r = row(100, "s1", 0.0);
        r.segment_id_ist = None;
        let (summaries, _) = collect_raw_segments(&[r]);
        assert!(summaries.is_empty());
    }

    #[test]
    fn endpoint_takes_the_last_reached_pose() {
        let mut a = row(100, "s1", 0.0);
        a.ap_position = Some([1.0, 1.0, 1.0]);
        let mut b = row(200, "s1", 1.0);
        b.ap_position = Some([2.0, 2.0, 2.0]);
        let (summaries, _) = collect_raw_segments(&[a, b]);
        assert_eq!(summaries[0].endpoint, Some([2.0, 2.0, 2.0]));
    }

    #[test]
    fn bundle_carries_tags_and_frequencies() {
        let raw_rows: Vec<RawRecord> = (0..100)
            .map(|i| row(1_719_234_567_000_000_000 + i * 10_000_000, "s1", i as f64))
            .collect();
        let (summaries, by_raw_id) = collect_raw_segments(&raw_rows);
        let group = BahnGroup {
            bahn_id: "1719234567".into(),
            raw_ids: summaries.iter().map(|s| s.raw_id.clone()).collect(),
        };
        let file = IngestFile {
            filename: "run_3kg_v500_calibration.csv".into(),
            content: String::new(),
        };
        let params = IngestParams {
            robot_model: Some("abb_irb4400".into()),
            bahnplanung: None,
            segmentation: SegmentationMethod::FixedSegments { count: 1 },
            persist: true,
        };
        let tags = FileTags::from_filename(&file.filename);

        let bundle = build_bundle(&group, &by_raw_id, &None, &tags, &file, &params);
        assert_eq!(bundle.info.weight, Some(3.0));
        assert!(bundle.info.calibration_run);
        assert_eq!(bundle.segments, vec!["1719234567_1".to_string()]);
        assert_eq!(bundle.position.len(), 100);
        // 100 samples over 0.99 s.
        let freq = bundle.info.frequency_position.unwrap();
        assert!((freq - 101.01).abs() < 0.1);
        assert_eq!(bundle.info.recording_date.as_deref(), Some("2024-06-24"));
    }

    #[test]
    fn recording_date_of_unset_start_is_none() {
        assert_eq!(recording_date(i64::MAX), None);
    }

    #[test]
    fn batch_dedupe_learns_newly_written_ids() {
        let mut existing: HashSet<String> = HashSet::from(["1719230000".to_string()]);
        let ingested = FileOutcome::Ingested {
            filename: "a.csv".into(),
            bahn_ids: vec!["1719234567".into()],
            segments_written: 3,
            rows_copied: 42,
        };
        note_ingested(&ingested, &mut existing);
        assert!(existing.contains("1719234567"));

        let skipped = FileOutcome::Skipped {
            filename: "b.csv".into(),
            reason: "already ingested".into(),
        };
        note_ingested(&skipped, &mut existing);
        assert_eq!(existing.len(), 2);
    }
}
