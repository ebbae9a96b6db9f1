//! `medwh detect` handlers.

use std::path::PathBuf;

use clap::Subcommand;
use medwh_core::AppConfig;

/// Sub-commands available under `detect`.
#[derive(Debug, Subcommand)]
pub enum DetectCommands {
    /// Classify raw detector output and write the detection CSV
    Aggregate {
        /// Detector JSON-lines output (defaults to `MEDWH_RAW_DETECTIONS_PATH`)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Detection CSV to write (defaults to `MEDWH_DETECTIONS_CSV_PATH`)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

pub(crate) fn run(command: DetectCommands, config: &AppConfig) -> anyhow::Result<()> {
    match command {
        DetectCommands::Aggregate { input, output } => {
            let input = input.unwrap_or_else(|| config.raw_detections_path.clone());
            let output = output.unwrap_or_else(|| config.detections_csv_path.clone());
            let detection = config.detection_config();

            let aggregated = medwh_ingest::aggregate_raw_detections(&input, &detection)?;
            medwh_ingest::write_detection_csv(&output, &aggregated.records, detection.field_cap)?;

            let mut counts = std::collections::BTreeMap::<&str, usize>::new();
            for record in &aggregated.records {
                let category = record.image_category.map_or("unknown", |c| c.as_str());
                *counts.entry(category).or_default() += 1;
            }

            println!(
                "wrote {} image(s) to {} ({} line(s) skipped)",
                aggregated.records.len(),
                output.display(),
                aggregated.lines_skipped
            );
            for (category, count) in counts {
                println!("  {category:<16} {count}");
            }
        }
    }
    Ok(())
}
