use std::path::PathBuf;

use crate::classifier::ClassifierConfig;
use crate::detections::DetectionConfig;
use crate::messages::LoaderConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Channels handed to the scrape command.
    pub channels: Vec<String>,
    /// Root of the date/channel partitioned message files.
    pub messages_dir: PathBuf,
    /// Root of the `<channel>/<message_id>.jpg` image tree.
    pub images_dir: PathBuf,
    /// JSON-lines file the detector writes, one image per line.
    pub raw_detections_path: PathBuf,
    /// Aggregated detection export consumed by the detection loader.
    pub detections_csv_path: PathBuf,
    pub confidence_threshold: f64,
    pub batch_size: usize,
    pub detection_field_cap: usize,
    pub scrape_command: String,
    pub detect_command: String,
    pub dbt_bin: String,
    pub dbt_project_dir: PathBuf,
    pub pipeline_cron: String,
    pub parallel_loaders: bool,
}

impl AppConfig {
    #[must_use]
    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            confidence_threshold: self.confidence_threshold,
        }
    }

    #[must_use]
    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            batch_size: self.batch_size,
        }
    }

    #[must_use]
    pub fn detection_config(&self) -> DetectionConfig {
        DetectionConfig {
            field_cap: self.detection_field_cap,
            classifier: self.classifier_config(),
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("channels", &self.channels)
            .field("messages_dir", &self.messages_dir)
            .field("images_dir", &self.images_dir)
            .field("raw_detections_path", &self.raw_detections_path)
            .field("detections_csv_path", &self.detections_csv_path)
            .field("confidence_threshold", &self.confidence_threshold)
            .field("batch_size", &self.batch_size)
            .field("detection_field_cap", &self.detection_field_cap)
            .field("scrape_command", &self.scrape_command)
            .field("detect_command", &self.detect_command)
            .field("dbt_bin", &self.dbt_bin)
            .field("dbt_project_dir", &self.dbt_project_dir)
            .field("pipeline_cron", &self.pipeline_cron)
            .field("parallel_loaders", &self.parallel_loaders)
            .finish()
    }
}
