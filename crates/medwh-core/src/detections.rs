use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::classifier::ClassifierConfig;
use crate::CoreError;

/// Number of `detected_class_N` / `confidence_N` column pairs in the raw
/// detections table.
pub const MAX_DETECTION_FIELDS: usize = 20;

/// Business category assigned to a scraped image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageCategory {
    Promotional,
    ProductDisplay,
    Lifestyle,
    Other,
}

impl ImageCategory {
    pub const ALL: [ImageCategory; 4] = [
        ImageCategory::Promotional,
        ImageCategory::ProductDisplay,
        ImageCategory::Lifestyle,
        ImageCategory::Other,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ImageCategory::Promotional => "promotional",
            ImageCategory::ProductDisplay => "product_display",
            ImageCategory::Lifestyle => "lifestyle",
            ImageCategory::Other => "other",
        }
    }
}

impl std::fmt::Display for ImageCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "promotional" => Ok(ImageCategory::Promotional),
            "product_display" => Ok(ImageCategory::ProductDisplay),
            "lifestyle" => Ok(ImageCategory::Lifestyle),
            "other" => Ok(ImageCategory::Other),
            other => Err(CoreError::InvalidCategory(other.to_string())),
        }
    }
}

/// One labeled bounding box reported by the object detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    /// COCO class id.
    pub class_id: u32,
    pub class_name: String,
    pub confidence: f64,
}

/// One image's aggregated detection summary, keyed by
/// `(message_id, channel_name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub message_id: i64,
    pub channel_name: String,
    pub image_path: Option<String>,
    /// `None` when the export carried a category this build does not know.
    pub image_category: Option<ImageCategory>,
    pub num_detections: Option<i32>,
    pub max_confidence: Option<f64>,
    /// Comma-separated class names, in detector order.
    pub detected_classes: Option<String>,
    /// `(class_name, confidence)` pairs, at most the configured field cap.
    /// An empty class name marks a blank position ahead of a filled one.
    pub detections: Vec<(String, Option<f64>)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionConfig {
    /// Maximum number of `(class, confidence)` pairs kept per image.
    pub field_cap: usize,
    pub classifier: ClassifierConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            field_cap: MAX_DETECTION_FIELDS,
            classifier: ClassifierConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_round_trips_through_str() {
        for category in ImageCategory::ALL {
            assert_eq!(category.as_str().parse::<ImageCategory>().unwrap(), category);
        }
    }

    #[test]
    fn category_rejects_unknown_value() {
        let err = "billboard".parse::<ImageCategory>().unwrap_err();
        assert!(matches!(err, CoreError::InvalidCategory(ref v) if v == "billboard"));
    }

    #[test]
    fn category_serializes_snake_case() {
        let json = serde_json::to_string(&ImageCategory::ProductDisplay).unwrap();
        assert_eq!(json, "\"product_display\"");
    }

    #[test]
    fn detection_config_defaults() {
        let config = DetectionConfig::default();
        assert_eq!(config.field_cap, 20);
        assert!((config.classifier.confidence_threshold - 0.25).abs() < f64::EPSILON);
    }
}
