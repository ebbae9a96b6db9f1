//! Detection-to-category classification for scraped images.
//!
//! The rule only looks at two flags derived from the surviving detections:
//! whether a person is present and whether a container-like product is
//! present. Order, count, and which product class matched do not matter.

use crate::detections::{DetectedObject, ImageCategory};

/// COCO class id for `person`.
pub const CLASS_PERSON: u32 = 0;
/// COCO class id for `bottle`.
pub const CLASS_BOTTLE: u32 = 39;
/// COCO class id for `cup`.
pub const CLASS_CUP: u32 = 41;
/// COCO class id for `bowl`.
pub const CLASS_BOWL: u32 = 45;

/// Container-like classes that count as a product being on display.
pub const PRODUCT_CLASSES: [u32; 3] = [CLASS_BOTTLE, CLASS_CUP, CLASS_BOWL];

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierConfig {
    /// Detections strictly below this confidence are ignored.
    pub confidence_threshold: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

/// Classify one image from its list of detections.
///
/// - `promotional`: a person and a product
/// - `product_display`: a product, no person
/// - `lifestyle`: a person, no product
/// - `other`: neither
#[must_use]
pub fn classify_image(detections: &[DetectedObject], config: &ClassifierConfig) -> ImageCategory {
    let mut has_person = false;
    let mut has_product = false;

    // `>=` is false for NaN, so a NaN confidence never survives the filter.
    for detection in detections
        .iter()
        .filter(|d| d.confidence >= config.confidence_threshold)
    {
        if detection.class_id == CLASS_PERSON {
            has_person = true;
        } else if PRODUCT_CLASSES.contains(&detection.class_id) {
            has_product = true;
        }
    }

    match (has_person, has_product) {
        (true, true) => ImageCategory::Promotional,
        (false, true) => ImageCategory::ProductDisplay,
        (true, false) => ImageCategory::Lifestyle,
        (false, false) => ImageCategory::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class_id: u32, name: &str, confidence: f64) -> DetectedObject {
        DetectedObject {
            class_id,
            class_name: name.to_string(),
            confidence,
        }
    }

    fn classify(detections: &[DetectedObject]) -> ImageCategory {
        classify_image(detections, &ClassifierConfig::default())
    }

    #[test]
    fn person_alone_is_lifestyle() {
        assert_eq!(
            classify(&[det(CLASS_PERSON, "person", 0.9)]),
            ImageCategory::Lifestyle
        );
    }

    #[test]
    fn bottle_alone_is_product_display() {
        assert_eq!(
            classify(&[det(CLASS_BOTTLE, "bottle", 0.5)]),
            ImageCategory::ProductDisplay
        );
    }

    #[test]
    fn person_and_bottle_is_promotional() {
        let detections = [det(CLASS_PERSON, "person", 0.9), det(CLASS_BOTTLE, "bottle", 0.3)];
        assert_eq!(classify(&detections), ImageCategory::Promotional);
    }

    #[test]
    fn below_threshold_person_is_other() {
        assert_eq!(
            classify(&[det(CLASS_PERSON, "person", 0.1)]),
            ImageCategory::Other
        );
    }

    #[test]
    fn empty_list_is_other() {
        assert_eq!(classify(&[]), ImageCategory::Other);
    }

    #[test]
    fn only_below_threshold_detections_is_other() {
        let detections = [
            det(CLASS_PERSON, "person", 0.24),
            det(CLASS_CUP, "cup", 0.2),
            det(CLASS_BOWL, "bowl", 0.0),
            det(CLASS_BOTTLE, "bottle", 0.249_999),
        ];
        assert_eq!(classify(&detections), ImageCategory::Other);
    }

    #[test]
    fn detection_exactly_at_threshold_survives() {
        assert_eq!(
            classify(&[det(CLASS_CUP, "cup", DEFAULT_CONFIDENCE_THRESHOLD)]),
            ImageCategory::ProductDisplay
        );
    }

    #[test]
    fn nan_confidence_is_discarded() {
        assert_eq!(
            classify(&[det(CLASS_PERSON, "person", f64::NAN)]),
            ImageCategory::Other
        );
    }

    #[test]
    fn unrelated_classes_are_other() {
        let detections = [det(2, "car", 0.99), det(16, "dog", 0.8)];
        assert_eq!(classify(&detections), ImageCategory::Other);
    }

    #[test]
    fn every_product_class_counts_as_product() {
        for (class_id, name) in [(CLASS_BOTTLE, "bottle"), (CLASS_CUP, "cup"), (CLASS_BOWL, "bowl")] {
            assert_eq!(
                classify(&[det(class_id, name, 0.6)]),
                ImageCategory::ProductDisplay,
                "{name} should count as a product"
            );
        }
    }

    #[test]
    fn output_is_invariant_under_reordering() {
        let base = vec![
            det(CLASS_PERSON, "person", 0.9),
            det(2, "car", 0.7),
            det(CLASS_BOWL, "bowl", 0.4),
            det(CLASS_PERSON, "person", 0.1),
        ];
        let expected = classify(&base);
        assert_eq!(expected, ImageCategory::Promotional);

        let mut rotated = base.clone();
        for _ in 0..rotated.len() {
            rotated.rotate_left(1);
            assert_eq!(classify(&rotated), expected);
        }

        let mut reversed = base;
        reversed.reverse();
        assert_eq!(classify(&reversed), expected);
    }

    #[test]
    fn output_is_invariant_under_duplication() {
        let cases = [
            vec![det(CLASS_PERSON, "person", 0.9)],
            vec![det(CLASS_CUP, "cup", 0.5)],
            vec![det(CLASS_PERSON, "person", 0.9), det(CLASS_CUP, "cup", 0.5)],
            vec![det(CLASS_PERSON, "person", 0.05)],
        ];

        for case in cases {
            let expected = classify(&case);
            let mut doubled = case.clone();
            doubled.extend(case.iter().cloned());
            doubled.extend(case.iter().cloned());
            assert_eq!(classify(&doubled), expected);
        }
    }

    #[test]
    fn custom_threshold_is_respected() {
        let config = ClassifierConfig {
            confidence_threshold: 0.8,
        };
        let detections = [det(CLASS_PERSON, "person", 0.9), det(CLASS_BOTTLE, "bottle", 0.5)];
        assert_eq!(
            classify_image(&detections, &config),
            ImageCategory::Lifestyle
        );
    }
}
