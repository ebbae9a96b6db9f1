//! `medwh load` handlers: run one loader without the rest of the pipeline.

use std::path::PathBuf;

use clap::Subcommand;
use medwh_core::AppConfig;

/// Sub-commands available under `load`.
#[derive(Debug, Subcommand)]
pub enum LoadCommands {
    /// Load scraped message files into the raw message table
    Messages {
        /// Message directory (defaults to `MEDWH_MESSAGES_DIR`)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Load the aggregated detection CSV into the raw detection table
    Detections {
        /// Detection CSV (defaults to `MEDWH_DETECTIONS_CSV_PATH`)
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

pub(crate) async fn run(command: LoadCommands, config: &AppConfig) -> anyhow::Result<()> {
    match command {
        LoadCommands::Messages { dir } => {
            let dir = dir.unwrap_or_else(|| config.messages_dir.clone());
            if !dir.is_dir() {
                anyhow::bail!("message directory not found: {}", dir.display());
            }
            let pool = crate::connect(config).await?;
            let report =
                medwh_ingest::load_raw_messages(&pool, &dir, &config.loader_config()).await?;

            println!("{}", report.summary());
            if report.files_skipped > 0 || report.records_dropped > 0 {
                println!(
                    "  skipped {} unreadable file(s), dropped {} record(s) without keys",
                    report.files_skipped, report.records_dropped
                );
            }
            if let Some(stats) = &report.stats {
                println!(
                    "  table: {} messages, {} channels",
                    stats.total_messages, stats.unique_channels
                );
            }
        }
        LoadCommands::Detections { csv } => {
            let csv = csv.unwrap_or_else(|| config.detections_csv_path.clone());
            if !csv.is_file() {
                anyhow::bail!("detection csv not found: {}", csv.display());
            }
            let pool = crate::connect(config).await?;
            let report =
                medwh_ingest::load_detections(&pool, &csv, &config.detection_config()).await?;

            println!("{}", report.summary());
            if report.rows_dropped > 0 {
                println!("  dropped {} row(s) without keys", report.rows_dropped);
            }
            if let Some(stats) = &report.stats {
                println!(
                    "  table: {} detections over {} messages",
                    stats.total_detections, stats.unique_messages
                );
            }
        }
    }
    Ok(())
}
