//! Live integration tests for medwh-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/medwh-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use chrono::{TimeZone, Utc};
use medwh_core::{DetectionRecord, ImageCategory, RawMessage};
use medwh_db::{
    detection_table_stats, insert_message_batch, insert_message_skip_duplicate,
    message_table_stats, replace_detection, BatchInsert,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn message(id: i64, channel: &str, day: u32) -> RawMessage {
    let mut msg = RawMessage::new(id, channel);
    msg.message_date = Some(Utc.with_ymd_and_hms(2025, 1, day, 9, 30, 0).unwrap());
    msg.message_text = Some(format!("message {id}"));
    msg.has_media = Some(false);
    msg.views = Some(120);
    msg
}

fn detection(id: i64, channel: &str, pairs: &[(&str, f64)]) -> DetectionRecord {
    DetectionRecord {
        message_id: id,
        channel_name: channel.to_string(),
        image_path: Some(format!("data/raw/images/{channel}/{id}.jpg")),
        image_category: Some(ImageCategory::Other),
        num_detections: Some(i32::try_from(pairs.len()).unwrap()),
        max_confidence: pairs.iter().map(|(_, c)| *c).reduce(f64::max),
        detected_classes: Some(
            pairs
                .iter()
                .map(|(name, _)| *name)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        detections: pairs
            .iter()
            .map(|(name, c)| ((*name).to_string(), Some(*c)))
            .collect(),
    }
}

async fn count_messages(pool: &sqlx::PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM raw.telegram_messages")
        .fetch_one(pool)
        .await
        .expect("count query failed")
}

// ---------------------------------------------------------------------------
// Section 1: raw messages
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn batch_insert_writes_all_rows(pool: sqlx::PgPool) {
    let batch = vec![
        message(1, "tikvahpharma", 1),
        message(2, "tikvahpharma", 1),
        message(1, "lobelia4cosmetics", 2),
    ];

    let outcome = insert_message_batch(&pool, &batch)
        .await
        .expect("insert_message_batch failed");

    assert_eq!(outcome, BatchInsert::Inserted(3));
    assert_eq!(count_messages(&pool).await, 3);
}

#[sqlx::test(migrations = "../../migrations")]
async fn batch_with_existing_key_reports_conflict_and_writes_nothing(pool: sqlx::PgPool) {
    insert_message_batch(&pool, &[message(1, "tikvahpharma", 1)])
        .await
        .expect("seed insert failed");

    let outcome = insert_message_batch(
        &pool,
        &[message(1, "tikvahpharma", 1), message(2, "tikvahpharma", 1)],
    )
    .await
    .expect("conflicting batch should not be an error");

    assert_eq!(outcome, BatchInsert::Conflict);
    assert_eq!(count_messages(&pool).await, 1, "batch must be all-or-nothing");
}

#[sqlx::test(migrations = "../../migrations")]
async fn batch_with_internal_duplicate_reports_conflict(pool: sqlx::PgPool) {
    let outcome = insert_message_batch(
        &pool,
        &[message(7, "tikvahpharma", 3), message(7, "tikvahpharma", 3)],
    )
    .await
    .expect("duplicate batch should not be an error");

    assert_eq!(outcome, BatchInsert::Conflict);
    assert_eq!(count_messages(&pool).await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn row_insert_skips_duplicate_key(pool: sqlx::PgPool) {
    let msg = message(10, "tikvahpharma", 4);

    assert!(insert_message_skip_duplicate(&pool, &msg).await.unwrap());
    assert!(!insert_message_skip_duplicate(&pool, &msg).await.unwrap());
    assert_eq!(count_messages(&pool).await, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn same_id_on_different_date_is_a_new_row(pool: sqlx::PgPool) {
    assert!(insert_message_skip_duplicate(&pool, &message(10, "tikvahpharma", 4))
        .await
        .unwrap());
    assert!(insert_message_skip_duplicate(&pool, &message(10, "tikvahpharma", 5))
        .await
        .unwrap());
    assert_eq!(count_messages(&pool).await, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn unknown_message_date_still_dedupes(pool: sqlx::PgPool) {
    let msg = RawMessage::new(99, "tikvahpharma");

    assert!(insert_message_skip_duplicate(&pool, &msg).await.unwrap());
    assert!(!insert_message_skip_duplicate(&pool, &msg).await.unwrap());
    assert_eq!(count_messages(&pool).await, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn unknown_counts_are_stored_as_null(pool: sqlx::PgPool) {
    let msg = RawMessage::new(5, "tikvahpharma");
    insert_message_skip_duplicate(&pool, &msg).await.unwrap();

    let views: Option<i32> =
        sqlx::query_scalar("SELECT views FROM raw.telegram_messages WHERE message_id = 5")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(views.is_none(), "unknown views must not become zero");
}

#[sqlx::test(migrations = "../../migrations")]
async fn message_stats_report_channels_and_date_range(pool: sqlx::PgPool) {
    insert_message_batch(
        &pool,
        &[
            message(1, "tikvahpharma", 2),
            message(2, "tikvahpharma", 9),
            message(3, "lobelia4cosmetics", 5),
        ],
    )
    .await
    .unwrap();

    let stats = message_table_stats(&pool).await.unwrap();
    assert_eq!(stats.total_messages, 3);
    assert_eq!(stats.unique_channels, 2);
    assert_eq!(
        stats.earliest_date,
        Some(Utc.with_ymd_and_hms(2025, 1, 2, 9, 30, 0).unwrap())
    );
    assert_eq!(
        stats.latest_date,
        Some(Utc.with_ymd_and_hms(2025, 1, 9, 9, 30, 0).unwrap())
    );
}

// ---------------------------------------------------------------------------
// Section 2: detections
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn replace_detection_inserts_new_key(pool: sqlx::PgPool) {
    let replaced = replace_detection(&pool, &detection(1, "tikvahpharma", &[("person", 0.9)]))
        .await
        .expect("replace_detection failed");

    assert!(!replaced, "nothing existed to replace");
    let stats = detection_table_stats(&pool).await.unwrap();
    assert_eq!(stats.total_detections, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn replace_detection_drops_stale_pair_columns(pool: sqlx::PgPool) {
    let first = detection(
        1,
        "tikvahpharma",
        &[("person", 0.9), ("bottle", 0.8), ("cup", 0.4)],
    );
    replace_detection(&pool, &first).await.unwrap();

    let mut second = detection(1, "tikvahpharma", &[("bowl", 0.6)]);
    second.image_category = Some(ImageCategory::ProductDisplay);
    let replaced = replace_detection(&pool, &second).await.unwrap();
    assert!(replaced);

    let row: (i64, Option<String>, Option<String>, Option<f64>, Option<String>, Option<f64>) =
        sqlx::query_as(
            "SELECT COUNT(*) OVER (), image_category, detected_class_1, confidence_1, \
                    detected_class_2, confidence_2 \
             FROM raw.yolo_detections \
             WHERE message_id = 1 AND channel_name = 'tikvahpharma'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();

    assert_eq!(row.0, 1, "key must hold exactly one row");
    assert_eq!(row.1.as_deref(), Some("product_display"));
    assert_eq!(row.2.as_deref(), Some("bowl"));
    assert_eq!(row.3, Some(0.6));
    assert!(row.4.is_none(), "stale detected_class_2 survived replacement");
    assert!(row.5.is_none(), "stale confidence_2 survived replacement");
}

#[sqlx::test(migrations = "../../migrations")]
async fn blank_pair_name_is_stored_as_null_in_place(pool: sqlx::PgPool) {
    let mut record = detection(4, "tikvahpharma", &[("person", 0.9), ("cup", 0.4)]);
    record.detections.insert(1, (String::new(), None));
    replace_detection(&pool, &record).await.unwrap();

    let row: (Option<String>, Option<String>, Option<String>) = sqlx::query_as(
        "SELECT detected_class_1, detected_class_2, detected_class_3 \
         FROM raw.yolo_detections WHERE message_id = 4",
    )
    .fetch_one(&pool)
    .await
    .unwrap();

    assert_eq!(row.0.as_deref(), Some("person"));
    assert!(row.1.is_none());
    assert_eq!(row.2.as_deref(), Some("cup"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn replace_detection_keys_on_message_and_channel(pool: sqlx::PgPool) {
    replace_detection(&pool, &detection(1, "tikvahpharma", &[]))
        .await
        .unwrap();
    replace_detection(&pool, &detection(1, "lobelia4cosmetics", &[]))
        .await
        .unwrap();

    let stats = detection_table_stats(&pool).await.unwrap();
    assert_eq!(stats.total_detections, 2);
    assert_eq!(stats.unique_messages, 1);
    assert_eq!(stats.unique_channels, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn detection_stats_break_down_by_category(pool: sqlx::PgPool) {
    let categories = [
        ImageCategory::Promotional,
        ImageCategory::Promotional,
        ImageCategory::Lifestyle,
        ImageCategory::Other,
    ];
    for (id, category) in (1_i64..).zip(categories) {
        let mut record = detection(id, "tikvahpharma", &[]);
        record.image_category = Some(category);
        replace_detection(&pool, &record).await.unwrap();
    }

    let stats = detection_table_stats(&pool).await.unwrap();
    assert_eq!(stats.total_detections, 4);
    assert_eq!(stats.count_for("promotional"), 2);
    assert_eq!(stats.count_for("lifestyle"), 1);
    assert_eq!(stats.count_for("other"), 1);
    assert_eq!(stats.count_for("product_display"), 0);
}
