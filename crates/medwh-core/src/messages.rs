use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// A scraped channel message, normalized for the raw layer.
///
/// `message_id` and `channel_name` are required. Every other field is
/// `None` when the source omitted it or it could not be interpreted, so an
/// unknown view count is never confused with zero views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub message_id: i64,
    pub channel_name: String,
    pub message_date: Option<DateTime<Utc>>,
    pub message_text: Option<String>,
    pub has_media: Option<bool>,
    pub image_path: Option<String>,
    pub views: Option<i32>,
    pub forwards: Option<i32>,
    pub is_reply: Option<bool>,
    pub reply_to_msg_id: Option<i64>,
    pub scraped_at: Option<DateTime<Utc>>,
}

impl RawMessage {
    /// A message with only its natural key populated.
    #[must_use]
    pub fn new(message_id: i64, channel_name: impl Into<String>) -> Self {
        Self {
            message_id,
            channel_name: channel_name.into(),
            message_date: None,
            message_text: None,
            has_media: None,
            image_path: None,
            views: None,
            forwards: None,
            is_reply: None,
            reply_to_msg_id: None,
            scraped_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Rows per insert batch.
    pub batch_size: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}
