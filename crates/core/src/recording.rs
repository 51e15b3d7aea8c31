//! Raw recording files: CSV parsing and filename conventions.
//!
//! A recording is a header-first CSV. Recognized column keys are listed in
//! a static mapping; unknown columns are ignored so recorder versions can
//! add channels freely. A leading comment of the form
//! `# transformation_matrix: ...` is carried verbatim into the Bahn info.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::CoreError;

/// Recognized header keys, per channel. Anything else is ignored.
pub const RECOGNIZED_COLUMNS: &[&str] = &[
    "timestamp",
    "segment_id_ist",
    "segment_id_soll",
    "x_soll",
    "y_soll",
    "z_soll",
    "qx_soll",
    "qy_soll",
    "qz_soll",
    "qw_soll",
    "tcp_speed_ist",
    "tcp_accel_ist",
    "joint_1",
    "joint_2",
    "joint_3",
    "joint_4",
    "joint_5",
    "joint_6",
    "ap_x",
    "ap_y",
    "ap_z",
    "aq_x",
    "aq_y",
    "aq_z",
    "aq_w",
];

/// One parsed data row. Channel groups a row does not carry stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub timestamp: i64,
    /// Raw segment id of the measured (actual) stream.
    pub segment_id_ist: Option<String>,
    /// Raw segment id of the commanded (setpoint) stream.
    pub segment_id_soll: Option<String>,
    pub position: Option<[f64; 3]>,
    pub orientation: Option<[f64; 4]>,
    pub tcp_speed: Option<f64>,
    pub tcp_accel: Option<f64>,
    pub joints: Option<[f64; 6]>,
    /// Reached-pose event position (AP point).
    pub ap_position: Option<[f64; 3]>,
    /// Reached-pose event orientation, quaternion `(x, y, z, w)`.
    pub ap_orientation: Option<[f64; 4]>,
}

/// A fully parsed recording file.
#[derive(Debug, Clone, Default)]
pub struct ParsedRecording {
    pub rows: Vec<RawRecord>,
    /// Verbatim payload of the `# transformation_matrix:` comment, if any.
    pub transformation_matrix: Option<String>,
}

/// Parse a recording file.
///
/// The first non-comment line must be the header. Rows with an unparseable
/// timestamp are skipped; any other malformed cell leaves its channel group
/// `None` for that row.
pub fn parse_recording(text: &str) -> Result<ParsedRecording, CoreError> {
    let mut transformation_matrix = None;
    let mut lines = text.lines().peekable();

    while let Some(line) = lines.peek() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("# transformation_matrix:") {
            transformation_matrix = Some(rest.trim().to_string());
            lines.next();
        } else if trimmed.starts_with('#') || trimmed.is_empty() {
            lines.next();
        } else {
            break;
        }
    }

    let header_line = lines
        .next()
        .ok_or_else(|| CoreError::Validation("Recording file is empty".into()))?;
    let headers = parse_csv_line(header_line);
    if headers.is_empty() {
        return Err(CoreError::Validation("Recording header row is empty".into()));
    }

    let column_index = |name: &str| headers.iter().position(|h| h == name);

    let ts_idx = column_index("timestamp")
        .ok_or_else(|| CoreError::Validation("Recording lacks a timestamp column".into()))?;
    let ist_idx = column_index("segment_id_ist");
    let soll_idx = column_index("segment_id_soll");
    let pos_idx: Option<[usize; 3]> = triple(column_index("x_soll"), column_index("y_soll"), column_index("z_soll"));
    let quat_idx = match (
        column_index("qx_soll"),
        column_index("qy_soll"),
        column_index("qz_soll"),
        column_index("qw_soll"),
    ) {
        (Some(a), Some(b), Some(c), Some(d)) => Some([a, b, c, d]),
        _ => None,
    };
    let speed_idx = column_index("tcp_speed_ist");
    let accel_idx = column_index("tcp_accel_ist");
    let joint_idx: Option<Vec<usize>> = (1..=6)
        .map(|i| column_index(&format!("joint_{i}")))
        .collect();
    let ap_idx = triple(column_index("ap_x"), column_index("ap_y"), column_index("ap_z"));
    let aq_idx = match (
        column_index("aq_x"),
        column_index("aq_y"),
        column_index("aq_z"),
        column_index("aq_w"),
    ) {
        (Some(a), Some(b), Some(c), Some(d)) => Some([a, b, c, d]),
        _ => None,
    };

    let mut rows = Vec::new();
    for line in lines {
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let cells = parse_csv_line(line);
        let cell = |i: usize| cells.get(i).map(|s| s.trim()).unwrap_or("");

        let Ok(timestamp) = cell(ts_idx).parse::<i64>() else {
            continue;
        };

        let float_at = |i: usize| cell(i).parse::<f64>().ok();
        let non_empty = |i: usize| {
            let v = cell(i);
            (!v.is_empty()).then(|| v.to_string())
        };

        let mut record = RawRecord {
            timestamp,
            segment_id_ist: ist_idx.and_then(non_empty),
            segment_id_soll: soll_idx.and_then(non_empty),
            tcp_speed: speed_idx.and_then(float_at),
            tcp_accel: accel_idx.and_then(float_at),
            ..Default::default()
        };
        if let Some([x, y, z]) = pos_idx {
            record.position = match (float_at(x), float_at(y), float_at(z)) {
                (Some(x), Some(y), Some(z)) => Some([x, y, z]),
                _ => None,
            };
        }
        if let Some([qx, qy, qz, qw]) = quat_idx {
            record.orientation = match (float_at(qx), float_at(qy), float_at(qz), float_at(qw)) {
                (Some(a), Some(b), Some(c), Some(d)) => Some([a, b, c, d]),
                _ => None,
            };
        }
        if let Some(idx) = &joint_idx {
            let values: Option<Vec<f64>> = idx.iter().map(|&i| float_at(i)).collect();
            record.joints = values.map(|v| [v[0], v[1], v[2], v[3], v[4], v[5]]);
        }
        if let Some([x, y, z]) = ap_idx {
            record.ap_position = match (float_at(x), float_at(y), float_at(z)) {
                (Some(x), Some(y), Some(z)) => Some([x, y, z]),
                _ => None,
            };
        }
        if let Some([qx, qy, qz, qw]) = aq_idx {
            record.ap_orientation = match (float_at(qx), float_at(qy), float_at(qz), float_at(qw)) {
                (Some(a), Some(b), Some(c), Some(d)) => Some([a, b, c, d]),
                _ => None,
            };
        }
        rows.push(record);
    }

    Ok(ParsedRecording {
        rows,
        transformation_matrix,
    })
}

fn triple(a: Option<usize>, b: Option<usize>, c: Option<usize>) -> Option<[usize; 3]> {
    match (a, b, c) {
        (Some(a), Some(b), Some(c)) => Some([a, b, c]),
        _ => None,
    }
}

/// Parse a single CSV line, handling quoted fields.
fn parse_csv_line(line: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(ch);
            }
        } else if ch == '"' {
            in_quotes = true;
        } else if ch == ',' {
            result.push(current.clone());
            current.clear();
        } else {
            current.push(ch);
        }
    }
    result.push(current);
    result
}

// ---------------------------------------------------------------------------
// Filename conventions
// ---------------------------------------------------------------------------

/// Run parameters encoded in the recording filename.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileTags {
    /// Tool weight in kg (`..._3kg_...` or `..._2_5kg_...`, underscore as
    /// decimal separator).
    pub weight_kg: Option<f64>,
    /// Planner velocity setting (`..._v500_...`).
    pub velocity: Option<f64>,
    /// Stop-point tolerance / zone value (`..._z10_...`).
    pub stop_point_tolerance: Option<f64>,
    /// Wait time at stop points in seconds (`..._wait2_...`).
    pub wait_time_s: Option<f64>,
    /// Calibration runs are marked by the substring `calibration`.
    pub calibration_run: bool,
    /// Pick-and-place runs are marked by the substring `pickplace`.
    pub pick_and_place_run: bool,
}

fn weight_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:_\d+)?)kg").expect("static regex"))
}

fn velocity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"_v(\d+)").expect("static regex"))
}

fn tolerance_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"_z(\d+)").expect("static regex"))
}

fn wait_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"_wait(\d+(?:_\d+)?)").expect("static regex"))
}

impl FileTags {
    /// Extract run parameters from a recording filename.
    pub fn from_filename(filename: &str) -> Self {
        let underscore_decimal = |s: &str| s.replace('_', ".").parse::<f64>().ok();

        let capture = |re: &Regex| {
            re.captures(filename)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        };

        FileTags {
            weight_kg: capture(weight_re()).and_then(|s| underscore_decimal(&s)),
            velocity: capture(velocity_re()).and_then(|s| s.parse().ok()),
            stop_point_tolerance: capture(tolerance_re()).and_then(|s| s.parse().ok()),
            wait_time_s: capture(wait_re()).and_then(|s| underscore_decimal(&s)),
            calibration_run: filename.contains("calibration"),
            pick_and_place_run: filename.contains("pickplace"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# transformation_matrix: 1 0 0 0; 0 1 0 0; 0 0 1 0; 0 0 0 1
timestamp,segment_id_ist,x_soll,y_soll,z_soll,tcp_speed_ist,unknown_col
1719234567000000000,seg_a,1.0,2.0,3.0,120.5,whatever
1719234567010000000,seg_a,1.1,2.1,3.1,121.0,ignored
bad_ts,seg_a,1.2,2.2,3.2,121.5,x
1719234567020000000,seg_b,,2.3,3.3,,x
";

    #[test]
    fn parses_rows_and_ignores_unknown_columns() {
        let parsed = parse_recording(SAMPLE).unwrap();
        assert_eq!(parsed.rows.len(), 3);
        assert_eq!(parsed.rows[0].position, Some([1.0, 2.0, 3.0]));
        assert_eq!(parsed.rows[0].tcp_speed, Some(120.5));
        assert_eq!(parsed.rows[0].segment_id_ist.as_deref(), Some("seg_a"));
        assert!(parsed.rows[0].orientation.is_none());
        assert!(parsed.rows[0].joints.is_none());
    }

    #[test]
    fn bad_timestamp_rows_are_skipped() {
        let parsed = parse_recording(SAMPLE).unwrap();
        assert!(parsed.rows.iter().all(|r| r.timestamp > 0));
    }

    #[test]
    fn incomplete_channel_group_stays_none() {
        let parsed = parse_recording(SAMPLE).unwrap();
        let last = parsed.rows.last().unwrap();
        assert!(last.position.is_none());
        assert!(last.tcp_speed.is_none());
        assert_eq!(last.segment_id_ist.as_deref(), Some("seg_b"));
    }

    #[test]
    fn transformation_matrix_comment_is_stored_verbatim() {
        let parsed = parse_recording(SAMPLE).unwrap();
        assert_eq!(
            parsed.transformation_matrix.as_deref(),
            Some("1 0 0 0; 0 1 0 0; 0 0 1 0; 0 0 0 1")
        );
    }

    #[test]
    fn missing_timestamp_column_is_a_validation_error() {
        let err = parse_recording("x_soll,y_soll\n1,2\n").unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn empty_file_is_a_validation_error() {
        assert!(parse_recording("").is_err());
    }

    #[test]
    fn quoted_cells_parse() {
        let text = "timestamp,segment_id_ist\n100,\"seg_\"\"a\"\"\"\n";
        let parsed = parse_recording(text).unwrap();
        assert_eq!(parsed.rows[0].segment_id_ist.as_deref(), Some("seg_\"a\""));
    }

    // -- Filename conventions ------------------------------------------------

    #[test]
    fn filename_tags_extract_all_parameters() {
        let tags =
            FileTags::from_filename("record_20240614_2_5kg_v500_z10_wait2_calibration.csv");
        assert_eq!(tags.weight_kg, Some(2.5));
        assert_eq!(tags.velocity, Some(500.0));
        assert_eq!(tags.stop_point_tolerance, Some(10.0));
        assert_eq!(tags.wait_time_s, Some(2.0));
        assert!(tags.calibration_run);
        assert!(!tags.pick_and_place_run);
    }

    #[test]
    fn filename_without_tags_yields_defaults() {
        let tags = FileTags::from_filename("plain_recording.csv");
        assert_eq!(tags, FileTags::default());
    }

    #[test]
    fn integer_weight_parses() {
        let tags = FileTags::from_filename("run_3kg_pickplace.csv");
        assert_eq!(tags.weight_kg, Some(3.0));
        assert!(tags.pick_and_place_run);
    }
}
