//! Ingestion-time segmentation: grouping raw recorder segments into Bahnen.
//!
//! The recorder emits a flat stream of raw segments; a Bahn is a contiguous
//! group of them. Two strategies exist: fixed-size grouping (after dropping
//! the approach and retract segments) and reference-position grouping, where
//! raw segments ending within epsilon of a given point mark Bahn boundaries.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::signal::euclidean;

/// Default boundary tolerance for reference-position grouping (mm).
pub const DEFAULT_REFERENCE_EPSILON: f64 = 0.3;

/// How a raw stream is cut into Bahnen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum SegmentationMethod {
    /// Groups of exactly `count` consecutive raw segments; the first and
    /// last raw segment of the stream (approach/retract) are dropped, and
    /// any remainder is discarded.
    FixedSegments { count: usize },
    /// Bahn boundaries are raw segments whose AP endpoint lies within
    /// `epsilon` of the reference point.
    ReferencePosition {
        x: f64,
        y: f64,
        z: f64,
        #[serde(default = "default_epsilon")]
        epsilon: f64,
    },
}

fn default_epsilon() -> f64 {
    DEFAULT_REFERENCE_EPSILON
}

impl SegmentationMethod {
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            SegmentationMethod::FixedSegments { count } if *count == 0 => Err(
                CoreError::Validation("fixed_segments requires a group size of at least 1".into()),
            ),
            SegmentationMethod::ReferencePosition { epsilon, .. } if *epsilon <= 0.0 => Err(
                CoreError::Validation("reference_position requires a positive epsilon".into()),
            ),
            _ => Ok(()),
        }
    }
}

/// Per-raw-segment summary the grouping operates on: id, earliest
/// timestamp, and the AP endpoint (last reached pose), when one exists.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSegmentSummary {
    pub raw_id: String,
    pub first_timestamp: i64,
    pub endpoint: Option<[f64; 3]>,
}

/// One grouped Bahn: its derived id and the raw segment ids it spans,
/// in input order. Raw segments are renumbered 1..k when materialized.
#[derive(Debug, Clone, PartialEq)]
pub struct BahnGroup {
    /// First 10 characters of the group's earliest timestamp
    /// (approximately Unix seconds).
    pub bahn_id: String,
    pub raw_ids: Vec<String>,
}

/// Apply a segmentation method to an ordered raw-segment stream.
pub fn group_segments(
    segments: &[RawSegmentSummary],
    method: &SegmentationMethod,
) -> Result<Vec<BahnGroup>, CoreError> {
    method.validate()?;
    let groups = match method {
        SegmentationMethod::FixedSegments { count } => group_fixed(segments, *count),
        SegmentationMethod::ReferencePosition { x, y, z, epsilon } => {
            group_reference(segments, [*x, *y, *z], *epsilon)
        }
    };
    Ok(groups)
}

/// Fixed grouping: drop first and last raw segment, then cut the rest into
/// `floor(len / n)` Bahnen of exactly `n` segments. The remainder is
/// discarded.
fn group_fixed(segments: &[RawSegmentSummary], n: usize) -> Vec<BahnGroup> {
    if segments.len() <= 2 {
        return Vec::new();
    }
    let interior = &segments[1..segments.len() - 1];
    interior
        .chunks_exact(n)
        .map(|chunk| make_group(chunk))
        .collect()
}

/// Reference-position grouping. Raw segments whose endpoint lies within
/// `epsilon` of `reference` mark Bahn boundaries. After each marker, the
/// marker itself and the segment following it are skipped (the robot is
/// repositioning); everything up to the next marker is one Bahn. A leading
/// chunk before the first marker is kept only when the stream does not
/// start at the reference point. Bahnen with one segment or fewer are
/// dropped.
fn group_reference(
    segments: &[RawSegmentSummary],
    reference: [f64; 3],
    epsilon: f64,
) -> Vec<BahnGroup> {
    let mut markers: Vec<usize> = segments
        .iter()
        .enumerate()
        .filter(|(_, s)| {
            s.endpoint
                .map(|p| euclidean(&p, &reference) <= epsilon)
                .unwrap_or(false)
        })
        .map(|(i, _)| i)
        .collect();
    markers.sort_unstable();

    if markers.is_empty() {
        // No boundary seen: the whole stream is one Bahn.
        return std::iter::once(segments)
            .filter(|s| s.len() > 1)
            .map(|s| make_group(s))
            .collect();
    }

    let mut spans: Vec<(usize, usize)> = Vec::new();
    if markers[0] > 0 {
        spans.push((0, markers[0]));
    }
    for (i, &marker) in markers.iter().enumerate() {
        let start = marker + 2;
        let end = markers.get(i + 1).copied().unwrap_or(segments.len());
        if start < end {
            spans.push((start, end));
        }
    }

    spans
        .into_iter()
        .map(|(start, end)| &segments[start..end])
        .filter(|chunk| chunk.len() > 1)
        .map(make_group)
        .collect()
}

fn make_group(chunk: &[RawSegmentSummary]) -> BahnGroup {
    let earliest = chunk
        .iter()
        .map(|s| s.first_timestamp)
        .min()
        .unwrap_or_default();
    let ts = earliest.to_string();
    let bahn_id = ts.chars().take(10).collect();
    BahnGroup {
        bahn_id,
        raw_ids: chunk.iter().map(|s| s.raw_id.clone()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(raw_id: &str, ts: i64, endpoint: Option<[f64; 3]>) -> RawSegmentSummary {
        RawSegmentSummary {
            raw_id: raw_id.to_string(),
            first_timestamp: ts,
            endpoint,
        }
    }

    fn stream(n: usize) -> Vec<RawSegmentSummary> {
        (0..n)
            .map(|i| {
                seg(
                    &format!("s{i}"),
                    1_719_234_567_000_000_000 + i as i64 * 1_000_000_000,
                    Some([100.0 + i as f64 * 10.0, 0.0, 0.0]),
                )
            })
            .collect()
    }

    // -- fixed_segments ------------------------------------------------------

    #[test]
    fn fixed_drops_approach_retract_and_remainder() {
        // 12 raw segments, group size 3: interior is 10, floor(10/3) = 3
        // Bahnen, 1 segment discarded.
        let groups = group_segments(&stream(12), &SegmentationMethod::FixedSegments { count: 3 })
            .unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].raw_ids, vec!["s1", "s2", "s3"]);
        assert_eq!(groups[2].raw_ids, vec!["s7", "s8", "s9"]);
    }

    #[test]
    fn fixed_on_tiny_stream_yields_nothing() {
        let groups = group_segments(&stream(2), &SegmentationMethod::FixedSegments { count: 2 })
            .unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn fixed_rejects_zero_group_size() {
        assert!(group_segments(&stream(5), &SegmentationMethod::FixedSegments { count: 0 })
            .is_err());
    }

    #[test]
    fn bahn_id_is_first_ten_timestamp_chars() {
        let groups = group_segments(&stream(5), &SegmentationMethod::FixedSegments { count: 3 })
            .unwrap();
        assert_eq!(groups[0].bahn_id, "1719234568");
    }

    // -- reference_position --------------------------------------------------

    fn reference_method() -> SegmentationMethod {
        SegmentationMethod::ReferencePosition {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            epsilon: DEFAULT_REFERENCE_EPSILON,
        }
    }

    #[test]
    fn reference_grouping_skips_marker_and_repositioning_segment() {
        // Markers at indices 0 and 5; the Bahn between them starts at
        // index 2 and runs to index 4.
        let mut s = stream(10);
        s[0].endpoint = Some([0.0, 0.0, 0.0]);
        s[5].endpoint = Some([0.1, 0.0, 0.0]);
        let groups = group_segments(&s, &reference_method()).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].raw_ids, vec!["s2", "s3", "s4"]);
        assert_eq!(groups[1].raw_ids, vec!["s7", "s8", "s9"]);
    }

    #[test]
    fn leading_chunk_is_kept_when_stream_starts_mid_run() {
        let mut s = stream(8);
        s[4].endpoint = Some([0.0, 0.0, 0.0]);
        let groups = group_segments(&s, &reference_method()).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].raw_ids, vec!["s0", "s1", "s2", "s3"]);
        assert_eq!(groups[1].raw_ids, vec!["s6", "s7"]);
    }

    #[test]
    fn single_segment_bahnen_are_dropped() {
        let mut s = stream(5);
        s[0].endpoint = Some([0.0, 0.0, 0.0]);
        // Bahn would span only index 3..5 minus marker skip: s2..s4 is
        // 3 segments; shrink stream so only one survives.
        let mut short = s[..4].to_vec();
        short[0].endpoint = Some([0.0, 0.0, 0.0]);
        let groups = group_segments(&short, &reference_method()).unwrap();
        // s2, s3 remain: still 2 segments, kept.
        assert_eq!(groups.len(), 1);

        let tiny = s[..3].to_vec();
        let groups = group_segments(&tiny, &reference_method()).unwrap();
        // Marker at 0; only s2 remains: dropped.
        assert!(groups.is_empty());
    }

    #[test]
    fn no_markers_means_one_bahn() {
        let s = stream(6);
        let groups = group_segments(&s, &reference_method()).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].raw_ids.len(), 6);
    }

    #[test]
    fn reference_rejects_non_positive_epsilon() {
        let method = SegmentationMethod::ReferencePosition {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            epsilon: 0.0,
        };
        assert!(group_segments(&stream(5), &method).is_err());
    }
}
