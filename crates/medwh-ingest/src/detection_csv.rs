//! The aggregated detection CSV exchanged between the detector and the
//! detection loader.
//!
//! Columns: `message_id, channel_name, image_path, image_category,
//! num_detections, max_confidence, detected_classes`, then
//! `detected_class_N, confidence_N` pairs for `N` in `1..=k`, where `k` is the
//! largest pair count present (never above the field cap).

use std::collections::HashMap;
use std::path::Path;

use medwh_core::{DetectionRecord, ImageCategory};

use crate::error::IngestError;
use crate::normalize::{parse_float_str, parse_int_str};

const FIXED_HEADERS: [&str; 7] = [
    "message_id",
    "channel_name",
    "image_path",
    "image_category",
    "num_detections",
    "max_confidence",
    "detected_classes",
];

#[derive(Debug, Default)]
pub struct ParsedDetections {
    pub records: Vec<DetectionRecord>,
    /// Rows without a usable key, or that the CSV reader rejected.
    pub rows_dropped: usize,
}

/// Write `records` as a detection CSV, creating parent directories.
///
/// # Errors
///
/// Returns [`IngestError::Io`] or [`IngestError::Csv`] on write failure.
pub fn write_detection_csv(
    path: &Path,
    records: &[DetectionRecord],
    field_cap: usize,
) -> Result<(), IngestError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| IngestError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let csv_err = |source| IngestError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let pair_count = records
        .iter()
        .map(|r| r.detections.len())
        .max()
        .unwrap_or(0)
        .min(field_cap);

    let mut header: Vec<String> = FIXED_HEADERS.iter().map(ToString::to_string).collect();
    for n in 1..=pair_count {
        header.push(format!("detected_class_{n}"));
        header.push(format!("confidence_{n}"));
    }

    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    writer.write_record(&header).map_err(csv_err)?;

    for record in records {
        let mut row = vec![
            record.message_id.to_string(),
            record.channel_name.clone(),
            record.image_path.clone().unwrap_or_default(),
            record
                .image_category
                .map(|c| c.as_str().to_string())
                .unwrap_or_default(),
            record.num_detections.map(|n| n.to_string()).unwrap_or_default(),
            record.max_confidence.map(|c| c.to_string()).unwrap_or_default(),
            record.detected_classes.clone().unwrap_or_default(),
        ];
        for n in 0..pair_count {
            match record.detections.get(n) {
                Some((name, confidence)) => {
                    row.push(name.clone());
                    row.push(confidence.map(|c| c.to_string()).unwrap_or_default());
                }
                None => {
                    row.push(String::new());
                    row.push(String::new());
                }
            }
        }
        writer.write_record(&row).map_err(csv_err)?;
    }

    writer.flush().map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::info!(
        path = %path.display(),
        rows = records.len(),
        pair_columns = pair_count,
        "wrote detection csv"
    );
    Ok(())
}

/// Read a detection CSV.
///
/// Empty cells are unknown. A row without a usable `message_id` or
/// `channel_name` is dropped; an unrecognized `image_category` is kept as
/// `None`. Both are logged. Pair columns beyond `field_cap` are ignored.
///
/// # Errors
///
/// Returns [`IngestError::SourceMissing`] if the file does not exist, or
/// [`IngestError::Csv`] if its header cannot be read.
pub fn read_detection_csv(path: &Path, field_cap: usize) -> Result<ParsedDetections, IngestError> {
    if !path.is_file() {
        return Err(IngestError::SourceMissing {
            path: path.to_path_buf(),
        });
    }
    let csv_err = |source| IngestError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;

    let columns: HashMap<String, usize> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.to_string(), idx))
        .collect();

    let mut parsed = ParsedDetections::default();
    for (idx, row) in reader.records().enumerate() {
        let row_no = idx + 2;
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(row = row_no, error = %e, "dropping unreadable csv row");
                parsed.rows_dropped += 1;
                continue;
            }
        };
        let cell = |name: &str| {
            columns
                .get(name)
                .and_then(|&i| row.get(i))
                .filter(|v| !v.is_empty())
        };

        let Some(message_id) = cell("message_id").and_then(parse_int_str) else {
            tracing::warn!(row = row_no, "dropping detection row without message_id");
            parsed.rows_dropped += 1;
            continue;
        };
        let Some(channel_name) = cell("channel_name") else {
            tracing::warn!(row = row_no, message_id, "dropping detection row without channel_name");
            parsed.rows_dropped += 1;
            continue;
        };

        let image_category = cell("image_category").and_then(|raw| {
            raw.parse::<ImageCategory>()
                .map_err(|e| {
                    tracing::warn!(row = row_no, message_id, error = %e, "storing unknown category as NULL");
                })
                .ok()
        });

        let mut detections: Vec<(String, Option<f64>)> = Vec::new();
        let mut blank_positions = Vec::new();
        for n in 1..=field_cap {
            let name = cell(format!("detected_class_{n}").as_str());
            let confidence = cell(format!("confidence_{n}").as_str()).and_then(parse_float_str);
            match name {
                Some(name) => detections.push((name.to_string(), confidence)),
                None => {
                    if confidence.is_some() {
                        tracing::warn!(row = row_no, message_id, pair = n, "confidence without class name");
                    }
                    blank_positions.push(detections.len());
                    detections.push((String::new(), confidence));
                }
            }
        }
        while detections
            .last()
            .is_some_and(|(name, confidence)| name.is_empty() && confidence.is_none())
        {
            detections.pop();
        }
        if blank_positions.iter().any(|&i| i < detections.len()) {
            tracing::warn!(row = row_no, message_id, "detection pairs have blank positions");
        }

        parsed.records.push(DetectionRecord {
            message_id,
            channel_name: channel_name.to_string(),
            image_path: cell("image_path").map(str::to_string),
            image_category,
            num_detections: cell("num_detections")
                .and_then(parse_int_str)
                .and_then(|n| i32::try_from(n).ok()),
            max_confidence: cell("max_confidence").and_then(parse_float_str),
            detected_classes: cell("detected_classes").map(str::to_string),
            detections,
        });
    }

    Ok(parsed)
}
