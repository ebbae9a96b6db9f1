//! Per-image aggregation of raw detector output.
//!
//! The detector writes one JSON object per line:
//! `{"image_path": "...", "detections": [{"class_id", "class_name", "confidence"}]}`.
//! Images live at `<images_dir>/<channel>/<message_id>.<ext>`, so the record
//! key is recovered from the path.

use std::io::{BufRead, BufReader};
use std::path::Path;

use medwh_core::{classify_image, DetectedObject, DetectionConfig, DetectionRecord};
use serde::Deserialize;

use crate::error::IngestError;

/// One line of detector output.
#[derive(Debug, Clone, Deserialize)]
pub struct RawImageDetections {
    pub image_path: String,
    #[serde(default)]
    pub detections: Vec<DetectedObject>,
}

#[derive(Debug, Default)]
pub struct AggregatedDetections {
    pub records: Vec<DetectionRecord>,
    /// Lines that were not valid JSON or had no derivable key.
    pub lines_skipped: usize,
}

/// Recover `(message_id, channel_name)` from an image path: the file stem is
/// the message id and the parent directory is the channel.
#[must_use]
pub fn key_from_image_path(path: &Path) -> Option<(i64, String)> {
    let message_id = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.parse::<i64>().ok())
        .filter(|id| *id > 0)?;
    let channel = path
        .parent()
        .and_then(Path::file_name)
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())?;
    Some((message_id, channel.to_string()))
}

/// Summarize one image's detections into a storable record.
///
/// `num_detections` and `detected_classes` describe everything the detector
/// reported; only the category applies the confidence threshold. Pairs are
/// ordered by descending confidence and truncated to `config.field_cap`.
#[must_use]
pub fn summarize_image(
    message_id: i64,
    channel_name: &str,
    image_path: &str,
    detections: &[DetectedObject],
    config: &DetectionConfig,
) -> DetectionRecord {
    let category = classify_image(detections, &config.classifier);

    let max_confidence = detections
        .iter()
        .map(|d| d.confidence)
        .filter(|c| c.is_finite())
        .fold(0.0_f64, f64::max);

    let detected_classes = detections
        .iter()
        .map(|d| d.class_name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let sort_key = |d: &DetectedObject| {
        if d.confidence.is_nan() {
            f64::NEG_INFINITY
        } else {
            d.confidence
        }
    };
    let mut ranked: Vec<&DetectedObject> = detections.iter().collect();
    ranked.sort_by(|a, b| sort_key(b).total_cmp(&sort_key(a)));

    let pairs = ranked
        .into_iter()
        .take(config.field_cap)
        .map(|d| {
            (
                d.class_name.clone(),
                Some(d.confidence).filter(|c| c.is_finite()),
            )
        })
        .collect();

    DetectionRecord {
        message_id,
        channel_name: channel_name.to_string(),
        image_path: Some(image_path.to_string()),
        image_category: Some(category),
        num_detections: Some(i32::try_from(detections.len()).unwrap_or(i32::MAX)),
        max_confidence: Some(max_confidence),
        detected_classes: Some(detected_classes).filter(|s| !s.is_empty()),
        detections: pairs,
    }
}

/// Read a detector JSON-lines file and summarize each image.
///
/// Blank lines are ignored. Unparseable lines and images whose key cannot be
/// derived are logged and skipped.
///
/// # Errors
///
/// Returns [`IngestError::SourceMissing`] if `path` does not exist, or
/// [`IngestError::Io`] if it cannot be read.
pub fn aggregate_raw_detections(
    path: &Path,
    config: &DetectionConfig,
) -> Result<AggregatedDetections, IngestError> {
    if !path.is_file() {
        return Err(IngestError::SourceMissing {
            path: path.to_path_buf(),
        });
    }
    let io_err = |source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = std::fs::File::open(path).map_err(io_err)?;

    let mut out = AggregatedDetections::default();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(io_err)?;
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }

        let raw: RawImageDetections = match serde_json::from_str(&line) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "skipping malformed detection line");
                out.lines_skipped += 1;
                continue;
            }
        };

        let Some((message_id, channel)) = key_from_image_path(Path::new(&raw.image_path)) else {
            tracing::warn!(
                line = line_no,
                image_path = %raw.image_path,
                "cannot derive message key from image path; skipping"
            );
            out.lines_skipped += 1;
            continue;
        };

        out.records.push(summarize_image(
            message_id,
            &channel,
            &raw.image_path,
            &raw.detections,
            config,
        ));
    }

    tracing::info!(
        images = out.records.len(),
        lines_skipped = out.lines_skipped,
        "aggregated raw detections"
    );
    Ok(out)
}
