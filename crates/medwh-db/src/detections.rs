//! Database operations for `raw.yolo_detections`.
//!
//! Detection results are regenerated on every detector run, so a new result
//! for an existing `(message_id, channel_name)` key supersedes the old row
//! completely.

use std::fmt::Write as _;
use std::sync::LazyLock;

use medwh_core::{DetectionRecord, MAX_DETECTION_FIELDS};
use sqlx::PgPool;

use crate::DbError;

/// Number of fixed (non-pair) columns bound before the detection pairs.
const FIXED_COLUMNS: usize = 7;

static INSERT_DETECTION_SQL: LazyLock<String> = LazyLock::new(build_insert_sql);

fn build_insert_sql() -> String {
    let mut columns = String::from(
        "message_id, channel_name, image_path, image_category, num_detections, \
         max_confidence, detected_classes",
    );
    for n in 1..=MAX_DETECTION_FIELDS {
        let _ = write!(columns, ", detected_class_{n}, confidence_{n}");
    }

    let placeholders = (1..=FIXED_COLUMNS + 2 * MAX_DETECTION_FIELDS)
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ");

    format!("INSERT INTO raw.yolo_detections ({columns}) VALUES ({placeholders})")
}

/// Row count for one `image_category` value (`None` for NULL categories).
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CategoryCount {
    pub image_category: Option<String>,
    pub count: i64,
}

/// Aggregate view of `raw.yolo_detections` for run summaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionTableStats {
    pub total_detections: i64,
    pub unique_messages: i64,
    pub unique_channels: i64,
    pub categories: Vec<CategoryCount>,
}

impl DetectionTableStats {
    /// Row count for `category`, zero when absent.
    #[must_use]
    pub fn count_for(&self, category: &str) -> i64 {
        self.categories
            .iter()
            .find(|c| c.image_category.as_deref() == Some(category))
            .map_or(0, |c| c.count)
    }

    /// Rows stored with a NULL `image_category`.
    #[must_use]
    pub fn unknown_count(&self) -> i64 {
        self.categories
            .iter()
            .filter(|c| c.image_category.is_none())
            .map(|c| c.count)
            .sum()
    }
}

#[derive(sqlx::FromRow)]
struct TotalsRow {
    total_detections: i64,
    unique_messages: i64,
    unique_channels: i64,
}

/// Replace the stored detection row for `record`'s key.
///
/// Deletes any existing row for `(message_id, channel_name)` and inserts the
/// new one inside a single transaction, so the key is never observably absent.
/// Every pair column is written; pairs the record does not carry become NULL.
///
/// Returns `true` when an existing row was superseded.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either statement or the commit fails; the
/// transaction is rolled back and the previous row is left in place.
pub async fn replace_detection(pool: &PgPool, record: &DetectionRecord) -> Result<bool, DbError> {
    let mut tx = pool.begin().await?;

    let deleted = sqlx::query(
        "DELETE FROM raw.yolo_detections \
         WHERE message_id = $1 AND channel_name = $2",
    )
    .bind(record.message_id)
    .bind(&record.channel_name)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let mut insert = sqlx::query(INSERT_DETECTION_SQL.as_str())
        .bind(record.message_id)
        .bind(&record.channel_name)
        .bind(record.image_path.as_deref())
        .bind(record.image_category.map(medwh_core::ImageCategory::as_str))
        .bind(record.num_detections)
        .bind(record.max_confidence)
        .bind(record.detected_classes.as_deref());

    for n in 0..MAX_DETECTION_FIELDS {
        let pair = record.detections.get(n);
        insert = insert
            .bind(
                pair.map(|(class_name, _)| class_name.as_str())
                    .filter(|class_name| !class_name.is_empty()),
            )
            .bind(pair.and_then(|(_, confidence)| *confidence));
    }

    insert.execute(&mut *tx).await?;
    tx.commit().await?;

    Ok(deleted > 0)
}

/// Summary statistics over the whole detections table, including a
/// per-category breakdown ordered by category name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either query fails.
pub async fn detection_table_stats(pool: &PgPool) -> Result<DetectionTableStats, DbError> {
    let totals = sqlx::query_as::<_, TotalsRow>(
        "SELECT COUNT(*)                     AS total_detections, \
                COUNT(DISTINCT message_id)   AS unique_messages, \
                COUNT(DISTINCT channel_name) AS unique_channels \
         FROM raw.yolo_detections",
    )
    .fetch_one(pool)
    .await?;

    let categories = sqlx::query_as::<_, CategoryCount>(
        "SELECT image_category, COUNT(*) AS count \
         FROM raw.yolo_detections \
         GROUP BY image_category \
         ORDER BY image_category NULLS LAST",
    )
    .fetch_all(pool)
    .await?;

    Ok(DetectionTableStats {
        total_detections: totals.total_detections,
        unique_messages: totals.unique_messages,
        unique_channels: totals.unique_channels,
        categories,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_sql_lists_every_pair_column() {
        let sql = build_insert_sql();
        assert!(sql.contains("detected_class_1, confidence_1"));
        assert!(sql.contains("detected_class_20, confidence_20"));
        assert!(!sql.contains("detected_class_21"));
        assert!(sql.ends_with("$47)"));
    }

    #[test]
    fn count_for_missing_category_is_zero() {
        let stats = DetectionTableStats {
            total_detections: 5,
            unique_messages: 5,
            unique_channels: 1,
            categories: vec![
                CategoryCount {
                    image_category: Some("lifestyle".to_string()),
                    count: 3,
                },
                CategoryCount {
                    image_category: None,
                    count: 2,
                },
            ],
        };
        assert_eq!(stats.count_for("lifestyle"), 3);
        assert_eq!(stats.count_for("promotional"), 0);
        assert_eq!(stats.unknown_count(), 2);
    }
}
