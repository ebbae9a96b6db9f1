//! `medwh pipeline` handlers.

use std::sync::Arc;

use clap::Subcommand;
use medwh_core::AppConfig;
use medwh_pipeline::{Pipeline, RunReport, Trigger};

/// Sub-commands available under `pipeline`.
#[derive(Debug, Subcommand)]
pub enum PipelineCommands {
    /// Run all four stages once
    Run {
        /// Run the two loaders one after the other instead of concurrently
        #[arg(long)]
        sequential: bool,
    },
    /// Run the pipeline on its cron schedule until interrupted
    Schedule {
        /// Override `MEDWH_PIPELINE_CRON` (six fields, seconds first)
        #[arg(long)]
        cron: Option<String>,
    },
}

pub(crate) async fn run(command: PipelineCommands, config: &AppConfig) -> anyhow::Result<()> {
    let pool = crate::connect(config).await?;
    medwh_db::run_migrations(&pool).await?;

    match command {
        PipelineCommands::Run { sequential } => {
            let pipeline =
                Pipeline::from_config(pool, config)?.parallel(config.parallel_loaders && !sequential);
            let report = pipeline.run(Trigger::Manual).await;
            print_report(&report);
            report.into_result()?;
        }
        PipelineCommands::Schedule { cron } => {
            let cron = cron.unwrap_or_else(|| config.pipeline_cron.clone());
            let pipeline = Arc::new(Pipeline::from_config(pool, config)?);
            let mut scheduler = medwh_pipeline::build_scheduler(pipeline, &cron).await?;
            println!("pipeline scheduled ({cron}); press Ctrl-C to stop");
            crate::shutdown_signal().await;
            scheduler.shutdown().await?;
        }
    }
    Ok(())
}

pub(crate) fn print_report(report: &RunReport) {
    println!("run {} ({})", report.run_id, report.trigger);
    for record in &report.stages {
        println!(
            "  {:<16} {:<8} {}",
            record.stage.as_str(),
            record.output.status.to_string(),
            record.output.message
        );
    }

    if let Some(failed) = report.failed_stage() {
        eprintln!("stage '{}' failed: {}", failed.stage, failed.output.message);
        if !failed.output.diagnostics.is_empty() {
            eprintln!("--- diagnostics ---");
            eprintln!("{}", failed.output.diagnostics);
        }
    }
}
