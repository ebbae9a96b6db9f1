pub mod app_config;
pub mod classifier;
pub mod config;
pub mod detections;
pub mod messages;

pub use app_config::{AppConfig, Environment};
pub use classifier::{
    classify_image, ClassifierConfig, CLASS_BOTTLE, CLASS_BOWL, CLASS_CUP, CLASS_PERSON,
    DEFAULT_CONFIDENCE_THRESHOLD, PRODUCT_CLASSES,
};
pub use config::{load_app_config, load_app_config_from_env};
pub use detections::{
    DetectedObject, DetectionConfig, DetectionRecord, ImageCategory, MAX_DETECTION_FIELDS,
};
pub use messages::{LoaderConfig, RawMessage};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid image category: {0}")]
    InvalidCategory(String),
}
