use std::path::PathBuf;

use crate::app_config::{AppConfig, Environment};
use crate::detections::MAX_DETECTION_FIELDS;
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let non_empty = |var: &str, default: &str| -> Result<String, ConfigError> {
        let raw = or_default(var, default);
        if raw.trim().is_empty() {
            return Err(invalid(var, "must not be empty".to_string()));
        }
        Ok(raw.trim().to_string())
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("MEDWH_ENV", "development"))?;
    let log_level = or_default("MEDWH_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("MEDWH_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("MEDWH_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("MEDWH_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let channels = parse_channels(&or_default(
        "MEDWH_CHANNELS",
        "lobelia4cosmetics,tikvahpharma",
    ))?;

    let messages_dir = PathBuf::from(or_default(
        "MEDWH_MESSAGES_DIR",
        "data/raw/telegram_messages",
    ));
    let images_dir = PathBuf::from(or_default("MEDWH_IMAGES_DIR", "data/raw/images"));
    let raw_detections_path = PathBuf::from(or_default(
        "MEDWH_RAW_DETECTIONS_PATH",
        "data/raw/yolo_raw_detections.jsonl",
    ));
    let detections_csv_path = PathBuf::from(or_default(
        "MEDWH_DETECTIONS_CSV_PATH",
        "data/raw/yolo_detections.csv",
    ));

    let confidence_threshold =
        parse_threshold(&or_default("MEDWH_CONFIDENCE_THRESHOLD", "0.25"))?;

    let batch_size = parse_usize("MEDWH_BATCH_SIZE", "1000")?;
    if batch_size == 0 {
        return Err(invalid(
            "MEDWH_BATCH_SIZE",
            "must be greater than 0".to_string(),
        ));
    }

    let detection_field_cap = parse_usize("MEDWH_DETECTION_FIELD_CAP", "20")?;
    if !(1..=MAX_DETECTION_FIELDS).contains(&detection_field_cap) {
        return Err(invalid(
            "MEDWH_DETECTION_FIELD_CAP",
            format!("must be between 1 and {MAX_DETECTION_FIELDS}"),
        ));
    }

    let scrape_command = non_empty("MEDWH_SCRAPE_COMMAND", "telegram-scrape")?;
    let detect_command = non_empty("MEDWH_DETECT_COMMAND", "yolo-detect")?;
    let dbt_bin = non_empty("MEDWH_DBT_BIN", "dbt")?;
    let dbt_project_dir = PathBuf::from(or_default("MEDWH_DBT_PROJECT_DIR", "medical_warehouse"));
    let pipeline_cron = non_empty("MEDWH_PIPELINE_CRON", "0 0 2 * * *")?;
    let parallel_loaders = parse_bool(
        "MEDWH_PARALLEL_LOADERS",
        &or_default("MEDWH_PARALLEL_LOADERS", "true"),
    )?;

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        channels,
        messages_dir,
        images_dir,
        raw_detections_path,
        detections_csv_path,
        confidence_threshold,
        batch_size,
        detection_field_cap,
        scrape_command,
        detect_command,
        dbt_bin,
        dbt_project_dir,
        pipeline_cron,
        parallel_loaders,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEnvVar`] for anything other than
/// `development`, `test`, or `production`.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "MEDWH_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

/// Split a comma-separated channel list, dropping blank entries.
fn parse_channels(raw: &str) -> Result<Vec<String>, ConfigError> {
    let channels: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|c| c.trim_start_matches('@').to_string())
        .collect();

    if channels.is_empty() {
        return Err(ConfigError::InvalidEnvVar {
            var: "MEDWH_CHANNELS".to_string(),
            reason: "at least one channel is required".to_string(),
        });
    }
    Ok(channels)
}

fn parse_threshold(raw: &str) -> Result<f64, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidEnvVar {
        var: "MEDWH_CONFIDENCE_THRESHOLD".to_string(),
        reason,
    };
    let value = raw.trim().parse::<f64>().map_err(|e| invalid(e.to_string()))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(format!("{value} is outside [0, 1]")));
    }
    Ok(value)
}

fn parse_bool(var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: format!("expected true or false, got '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
