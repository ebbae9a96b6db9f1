//! Loaders that move parsed files into the raw schema.
//!
//! Message loading is append-only with per-row duplicate fallback; detection
//! loading replaces by key. Per-row failures are counted and logged, never
//! fatal; only a missing source or a failed connection aborts a load.

use std::collections::BTreeMap;
use std::path::Path;

use medwh_core::{DetectionConfig, LoaderConfig, RawMessage};
use medwh_db::{BatchInsert, DetectionTableStats, MessageTableStats};
use sqlx::PgPool;

use crate::detection_csv::read_detection_csv;
use crate::error::IngestError;
use crate::messages::read_message_files;

#[derive(Debug, Default)]
pub struct MessageLoadReport {
    pub files_read: usize,
    pub files_skipped: usize,
    pub records_dropped: usize,
    pub parsed: usize,
    pub inserted: u64,
    pub skipped_duplicates: u64,
    pub failed_rows: u64,
    /// Table-wide statistics after the load; `None` when nothing was parsed
    /// or the statistics query failed.
    pub stats: Option<MessageTableStats>,
}

impl MessageLoadReport {
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "parsed {} messages from {} files: {} inserted, {} duplicates skipped, {} failed",
            self.parsed, self.files_read, self.inserted, self.skipped_duplicates, self.failed_rows
        )
    }
}

#[derive(Debug, Default)]
pub struct DetectionLoadReport {
    pub rows_read: usize,
    pub rows_dropped: usize,
    /// Rows for keys that had no previous detection.
    pub inserted: u64,
    /// Rows that superseded an existing detection for the same key.
    pub replaced: u64,
    pub failed_rows: u64,
    /// Loaded rows per category; unknown categories count under `"unknown"`.
    pub by_category: BTreeMap<String, u64>,
    pub stats: Option<DetectionTableStats>,
}

impl DetectionLoadReport {
    #[must_use]
    pub fn summary(&self) -> String {
        let categories = self
            .by_category
            .iter()
            .map(|(category, count)| format!("{category}={count}"))
            .collect::<Vec<_>>()
            .join(" ");
        format!(
            "read {} detection rows: {} inserted, {} replaced, {} failed [{categories}]",
            self.rows_read, self.inserted, self.replaced, self.failed_rows
        )
    }
}

/// Load every message file under `messages_dir` into `raw.telegram_messages`.
///
/// Records are inserted in batches of `config.batch_size`. A batch that fails
/// is retried row by row: duplicates are skipped and only the rows that fail
/// on their own are counted as failed.
///
/// # Errors
///
/// Returns [`IngestError::SourceMissing`] before touching the database if
/// `messages_dir` does not exist.
pub async fn load_raw_messages(
    pool: &PgPool,
    messages_dir: &Path,
    config: &LoaderConfig,
) -> Result<MessageLoadReport, IngestError> {
    let parsed = read_message_files(messages_dir)?;
    let mut report = MessageLoadReport {
        files_read: parsed.files_read,
        files_skipped: parsed.files_skipped,
        records_dropped: parsed.records_dropped,
        parsed: parsed.records.len(),
        ..MessageLoadReport::default()
    };

    if parsed.records.is_empty() {
        tracing::info!(dir = %messages_dir.display(), "no messages to load");
        return Ok(report);
    }

    let batch_size = config.batch_size.max(1);
    let batch_total = parsed.records.len().div_ceil(batch_size);
    for (idx, batch) in parsed.records.chunks(batch_size).enumerate() {
        match medwh_db::insert_message_batch(pool, batch).await {
            Ok(BatchInsert::Inserted(n)) => report.inserted += n,
            Ok(BatchInsert::Conflict) => {
                tracing::debug!(batch = idx + 1, "batch hit existing keys; inserting row by row");
                insert_rows_individually(pool, batch, &mut report).await;
            }
            Err(e) => {
                tracing::warn!(batch = idx + 1, rows = batch.len(), error = %e, "batch insert failed; inserting row by row");
                insert_rows_individually(pool, batch, &mut report).await;
            }
        }
        tracing::info!(
            batch = idx + 1,
            batches = batch_total,
            inserted = report.inserted,
            skipped = report.skipped_duplicates,
            "message batch processed"
        );
    }

    report.stats = match medwh_db::message_table_stats(pool).await {
        Ok(stats) => Some(stats),
        Err(e) => {
            tracing::warn!(error = %e, "could not read message table stats");
            None
        }
    };

    tracing::info!(
        inserted = report.inserted,
        skipped_duplicates = report.skipped_duplicates,
        failed_rows = report.failed_rows,
        "raw message load complete"
    );
    Ok(report)
}

async fn insert_rows_individually(pool: &PgPool, batch: &[RawMessage], report: &mut MessageLoadReport) {
    for msg in batch {
        match medwh_db::insert_message_skip_duplicate(pool, msg).await {
            Ok(true) => report.inserted += 1,
            Ok(false) => report.skipped_duplicates += 1,
            Err(e) => {
                tracing::warn!(
                    message_id = msg.message_id,
                    channel = %msg.channel_name,
                    error = %e,
                    "message insert failed"
                );
                report.failed_rows += 1;
            }
        }
    }
}

/// Load the detection CSV at `csv_path` into `raw.yolo_detections`.
///
/// Each row replaces any stored row for its `(message_id, channel_name)` in
/// its own transaction. A file with no data rows is a successful no-op.
///
/// # Errors
///
/// Returns [`IngestError::SourceMissing`] if the CSV does not exist, or
/// [`IngestError::Csv`] if its header is unreadable.
pub async fn load_detections(
    pool: &PgPool,
    csv_path: &Path,
    config: &DetectionConfig,
) -> Result<DetectionLoadReport, IngestError> {
    let parsed = read_detection_csv(csv_path, config.field_cap)?;
    let mut report = DetectionLoadReport {
        rows_read: parsed.records.len(),
        rows_dropped: parsed.rows_dropped,
        ..DetectionLoadReport::default()
    };

    if parsed.records.is_empty() {
        tracing::info!(path = %csv_path.display(), "no detection rows to load");
        return Ok(report);
    }

    for record in &parsed.records {
        match medwh_db::replace_detection(pool, record).await {
            Ok(replaced) => {
                if replaced {
                    report.replaced += 1;
                } else {
                    report.inserted += 1;
                }
                let category = record
                    .image_category
                    .map_or("unknown", medwh_core::ImageCategory::as_str);
                *report.by_category.entry(category.to_string()).or_default() += 1;
            }
            Err(e) => {
                tracing::warn!(
                    message_id = record.message_id,
                    channel = %record.channel_name,
                    error = %e,
                    "detection insert failed"
                );
                report.failed_rows += 1;
            }
        }
    }

    report.stats = match medwh_db::detection_table_stats(pool).await {
        Ok(stats) => Some(stats),
        Err(e) => {
            tracing::warn!(error = %e, "could not read detection table stats");
            None
        }
    };

    tracing::info!(
        inserted = report.inserted,
        replaced = report.replaced,
        failed_rows = report.failed_rows,
        "detection load complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_summary_mentions_counts() {
        let report = MessageLoadReport {
            files_read: 2,
            parsed: 10,
            inserted: 7,
            skipped_duplicates: 3,
            ..MessageLoadReport::default()
        };
        assert_eq!(
            report.summary(),
            "parsed 10 messages from 2 files: 7 inserted, 3 duplicates skipped, 0 failed"
        );
    }

    #[test]
    fn detection_summary_lists_categories_in_order() {
        let mut report = DetectionLoadReport {
            rows_read: 3,
            inserted: 3,
            ..DetectionLoadReport::default()
        };
        report.by_category.insert("promotional".to_string(), 2);
        report.by_category.insert("lifestyle".to_string(), 1);
        assert_eq!(
            report.summary(),
            "read 3 detection rows: 3 inserted, 0 replaced, 0 failed [lifestyle=1 promotional=2]"
        );
    }
}
