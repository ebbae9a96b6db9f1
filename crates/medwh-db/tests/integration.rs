//! Offline unit tests for medwh-db pool configuration and row types.
//! These tests do not require a live database connection.

use std::path::PathBuf;

use medwh_core::{AppConfig, Environment};
use medwh_db::{BatchInsert, MessageTableStats, PoolConfig};

fn app_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        log_level: "info".to_string(),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        channels: vec!["tikvahpharma".to_string()],
        messages_dir: PathBuf::from("data/raw/telegram_messages"),
        images_dir: PathBuf::from("data/raw/images"),
        raw_detections_path: PathBuf::from("data/raw/yolo_raw_detections.jsonl"),
        detections_csv_path: PathBuf::from("data/raw/yolo_detections.csv"),
        confidence_threshold: 0.25,
        batch_size: 1000,
        detection_field_cap: 20,
        scrape_command: "telegram-scrape".to_string(),
        detect_command: "yolo-detect".to_string(),
        dbt_bin: "dbt".to_string(),
        dbt_project_dir: PathBuf::from("medical_warehouse"),
        pipeline_cron: "0 0 2 * * *".to_string(),
        parallel_loaders: true,
    }
}

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let pool_config = PoolConfig::from_app_config(&app_config());
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[test]
fn batch_insert_outcomes_are_distinct() {
    assert_ne!(BatchInsert::Inserted(0), BatchInsert::Conflict);
    assert_eq!(BatchInsert::Inserted(3), BatchInsert::Inserted(3));
}

/// Compile-time smoke test: confirm that [`MessageTableStats`] has all
/// expected fields with the correct types. No database required.
#[test]
fn message_table_stats_has_expected_fields() {
    let stats = MessageTableStats {
        total_messages: 0,
        unique_channels: 0,
        earliest_date: None,
        latest_date: None,
    };
    assert_eq!(stats.total_messages, 0);
    assert!(stats.earliest_date.is_none());
}
