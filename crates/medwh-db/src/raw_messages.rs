//! Database operations for `raw.telegram_messages`.
//!
//! Messages are append-only source data: a row whose natural key
//! `(message_id, channel_name, message_date)` already exists is skipped,
//! never updated.

use chrono::{DateTime, Utc};
use medwh_core::RawMessage;
use sqlx::PgPool;

use crate::{is_unique_violation, DbError};

/// Result of a multi-row insert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchInsert {
    /// Every row in the batch was written.
    Inserted(u64),
    /// At least one row collided with an existing key (or another row in the
    /// same batch); nothing from the batch was written.
    Conflict,
}

/// Aggregate view of `raw.telegram_messages` for run summaries.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct MessageTableStats {
    pub total_messages: i64,
    pub unique_channels: i64,
    pub earliest_date: Option<DateTime<Utc>>,
    pub latest_date: Option<DateTime<Utc>>,
}

/// Insert `messages` as one statement with no conflict handling.
///
/// The statement is atomic: on a unique violation the whole batch is rolled
/// back and [`BatchInsert::Conflict`] is returned so the caller can retry row
/// by row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] for any failure other than a unique violation.
pub async fn insert_message_batch(
    pool: &PgPool,
    messages: &[RawMessage],
) -> Result<BatchInsert, DbError> {
    if messages.is_empty() {
        return Ok(BatchInsert::Inserted(0));
    }

    let mut message_ids: Vec<i64> = Vec::with_capacity(messages.len());
    let mut channel_names: Vec<String> = Vec::with_capacity(messages.len());
    let mut message_dates: Vec<Option<DateTime<Utc>>> = Vec::with_capacity(messages.len());
    let mut message_texts: Vec<Option<String>> = Vec::with_capacity(messages.len());
    let mut has_medias: Vec<Option<bool>> = Vec::with_capacity(messages.len());
    let mut image_paths: Vec<Option<String>> = Vec::with_capacity(messages.len());
    let mut views: Vec<Option<i32>> = Vec::with_capacity(messages.len());
    let mut forwards: Vec<Option<i32>> = Vec::with_capacity(messages.len());
    let mut is_replies: Vec<Option<bool>> = Vec::with_capacity(messages.len());
    let mut reply_to_msg_ids: Vec<Option<i64>> = Vec::with_capacity(messages.len());
    let mut scraped_ats: Vec<Option<DateTime<Utc>>> = Vec::with_capacity(messages.len());

    for msg in messages {
        message_ids.push(msg.message_id);
        channel_names.push(msg.channel_name.clone());
        message_dates.push(msg.message_date);
        message_texts.push(msg.message_text.clone());
        has_medias.push(msg.has_media);
        image_paths.push(msg.image_path.clone());
        views.push(msg.views);
        forwards.push(msg.forwards);
        is_replies.push(msg.is_reply);
        reply_to_msg_ids.push(msg.reply_to_msg_id);
        scraped_ats.push(msg.scraped_at);
    }

    let result = sqlx::query(
        "INSERT INTO raw.telegram_messages \
             (message_id, channel_name, message_date, message_text, has_media, image_path, \
              views, forwards, is_reply, reply_to_msg_id, scraped_at) \
         SELECT * FROM UNNEST(\
              $1::int8[], $2::text[], $3::timestamptz[], $4::text[], $5::bool[], $6::text[], \
              $7::int4[], $8::int4[], $9::bool[], $10::int8[], $11::timestamptz[])",
    )
    .bind(&message_ids)
    .bind(&channel_names)
    .bind(&message_dates)
    .bind(&message_texts)
    .bind(&has_medias)
    .bind(&image_paths)
    .bind(&views)
    .bind(&forwards)
    .bind(&is_replies)
    .bind(&reply_to_msg_ids)
    .bind(&scraped_ats)
    .execute(pool)
    .await;

    match result {
        Ok(done) => Ok(BatchInsert::Inserted(done.rows_affected())),
        Err(err) if is_unique_violation(&err) => Ok(BatchInsert::Conflict),
        Err(err) => Err(err.into()),
    }
}

/// Insert a single message, skipping it if its natural key already exists.
///
/// Returns `true` when a row was written, `false` when it was a duplicate.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails for any other reason.
pub async fn insert_message_skip_duplicate(
    pool: &PgPool,
    msg: &RawMessage,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "INSERT INTO raw.telegram_messages \
             (message_id, channel_name, message_date, message_text, has_media, image_path, \
              views, forwards, is_reply, reply_to_msg_id, scraped_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         ON CONFLICT ON CONSTRAINT telegram_messages_natural_key DO NOTHING",
    )
    .bind(msg.message_id)
    .bind(&msg.channel_name)
    .bind(msg.message_date)
    .bind(msg.message_text.as_deref())
    .bind(msg.has_media)
    .bind(msg.image_path.as_deref())
    .bind(msg.views)
    .bind(msg.forwards)
    .bind(msg.is_reply)
    .bind(msg.reply_to_msg_id)
    .bind(msg.scraped_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Summary statistics over the whole messages table.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn message_table_stats(pool: &PgPool) -> Result<MessageTableStats, DbError> {
    let stats = sqlx::query_as::<_, MessageTableStats>(
        "SELECT COUNT(*)                     AS total_messages, \
                COUNT(DISTINCT channel_name) AS unique_channels, \
                MIN(message_date)            AS earliest_date, \
                MAX(message_date)            AS latest_date \
         FROM raw.telegram_messages",
    )
    .fetch_one(pool)
    .await?;

    Ok(stats)
}
