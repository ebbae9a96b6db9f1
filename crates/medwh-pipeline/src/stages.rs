//! The concrete units of work behind each pipeline stage.

use std::fmt::Write as _;
use std::path::PathBuf;

use async_trait::async_trait;
use medwh_core::{AppConfig, DetectionConfig, LoaderConfig};
use medwh_ingest::{aggregate_raw_detections, load_detections, load_raw_messages, write_detection_csv};
use sqlx::PgPool;

use crate::command::{run_command, CommandSpec};
use crate::stage::{StageError, StageOutput, UnitOfWork};

fn parse_configured(command_line: &str, what: &str) -> Result<CommandSpec, StageError> {
    CommandSpec::parse(command_line)
        .ok_or_else(|| StageError::MissingResource(format!("{what} command is not configured")))
}

/// A stage that is nothing but one external command.
#[derive(Debug, Clone)]
pub struct CommandStage {
    step: String,
    spec: CommandSpec,
}

impl CommandStage {
    pub fn new(step: impl Into<String>, spec: CommandSpec) -> Self {
        Self {
            step: step.into(),
            spec,
        }
    }

    /// The scrape command, told where to write through `MEDWH_*` variables.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::MissingResource`] if no scrape command is set.
    pub fn scrape(config: &AppConfig) -> Result<Self, StageError> {
        let spec = parse_configured(&config.scrape_command, "scrape")?
            .env("MEDWH_CHANNELS", config.channels.join(","))
            .env("MEDWH_MESSAGES_DIR", config.messages_dir.display().to_string())
            .env("MEDWH_IMAGES_DIR", config.images_dir.display().to_string());
        Ok(Self::new("scrape", spec))
    }
}

#[async_trait]
impl UnitOfWork for CommandStage {
    async fn execute(&self, _inputs: &[StageOutput]) -> Result<StageOutput, StageError> {
        let output = run_command(&self.step, &self.spec).await?;
        Ok(StageOutput::success(
            format!("{} completed", self.step),
            output.combined(),
        ))
    }
}

/// Loads scraped message files into the raw message table.
#[derive(Debug, Clone)]
pub struct LoadRawStage {
    pool: PgPool,
    messages_dir: PathBuf,
    loader: LoaderConfig,
}

impl LoadRawStage {
    pub fn new(pool: PgPool, messages_dir: impl Into<PathBuf>, loader: LoaderConfig) -> Self {
        Self {
            pool,
            messages_dir: messages_dir.into(),
            loader,
        }
    }
}

#[async_trait]
impl UnitOfWork for LoadRawStage {
    async fn execute(&self, _inputs: &[StageOutput]) -> Result<StageOutput, StageError> {
        let report = load_raw_messages(&self.pool, &self.messages_dir, &self.loader).await?;

        let mut diagnostics = format!(
            "files_read={} files_skipped={} records_dropped={} failed_rows={}",
            report.files_read, report.files_skipped, report.records_dropped, report.failed_rows
        );
        if let Some(stats) = &report.stats {
            let _ = write!(
                diagnostics,
                "\ntable: {} messages across {} channels",
                stats.total_messages, stats.unique_channels
            );
            if let (Some(earliest), Some(latest)) = (stats.earliest_date, stats.latest_date) {
                let _ = write!(diagnostics, " from {earliest} to {latest}");
            }
        }

        Ok(StageOutput::success(report.summary(), diagnostics))
    }
}

/// Runs the detector, aggregates its output into the detection CSV and loads
/// the CSV.
#[derive(Debug, Clone)]
pub struct DetectAndLoadStage {
    pool: PgPool,
    detect: CommandSpec,
    images_dir: PathBuf,
    raw_detections_path: PathBuf,
    csv_path: PathBuf,
    detection: DetectionConfig,
}

impl DetectAndLoadStage {
    pub fn new(
        pool: PgPool,
        detect: CommandSpec,
        images_dir: impl Into<PathBuf>,
        raw_detections_path: impl Into<PathBuf>,
        csv_path: impl Into<PathBuf>,
        detection: DetectionConfig,
    ) -> Self {
        Self {
            pool,
            detect,
            images_dir: images_dir.into(),
            raw_detections_path: raw_detections_path.into(),
            csv_path: csv_path.into(),
            detection,
        }
    }

    /// # Errors
    ///
    /// Returns [`StageError::MissingResource`] if no detect command is set.
    pub fn from_config(pool: PgPool, config: &AppConfig) -> Result<Self, StageError> {
        let detect = parse_configured(&config.detect_command, "detect")?
            .env("MEDWH_IMAGES_DIR", config.images_dir.display().to_string())
            .env(
                "MEDWH_RAW_DETECTIONS_PATH",
                config.raw_detections_path.display().to_string(),
            );
        Ok(Self::new(
            pool,
            detect,
            &config.images_dir,
            &config.raw_detections_path,
            &config.detections_csv_path,
            config.detection_config(),
        ))
    }
}

#[async_trait]
impl UnitOfWork for DetectAndLoadStage {
    async fn execute(&self, _inputs: &[StageOutput]) -> Result<StageOutput, StageError> {
        if !self.images_dir.is_dir() {
            return Err(StageError::MissingResource(format!(
                "image directory {}",
                self.images_dir.display()
            )));
        }

        let detector = run_command("detect", &self.detect).await?;

        let aggregated = aggregate_raw_detections(&self.raw_detections_path, &self.detection)?;
        write_detection_csv(&self.csv_path, &aggregated.records, self.detection.field_cap)?;
        let report = load_detections(&self.pool, &self.csv_path, &self.detection).await?;

        let mut diagnostics = detector.combined();
        if !diagnostics.is_empty() {
            diagnostics.push('\n');
        }
        let _ = write!(
            diagnostics,
            "images={} lines_skipped={} rows_dropped={} failed_rows={}",
            aggregated.records.len(),
            aggregated.lines_skipped,
            report.rows_dropped,
            report.failed_rows
        );

        Ok(StageOutput::success(report.summary(), diagnostics))
    }
}

/// One step of the transform procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformStep {
    pub name: String,
    pub args: Vec<String>,
    /// A failing advisory step is logged and reported but does not fail the
    /// stage.
    pub advisory: bool,
}

impl TransformStep {
    pub fn new<I, S>(name: impl Into<String>, args: I, advisory: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
            advisory,
        }
    }

    /// Install packages, build staging, build marts on top of staging, then
    /// run the advisory tests.
    #[must_use]
    pub fn dbt_defaults() -> Vec<Self> {
        vec![
            Self::new("deps", ["deps"], false),
            Self::new("run staging", ["run", "--select", "staging"], false),
            Self::new("run marts", ["run", "--select", "marts"], false),
            Self::new("test", ["test"], true),
        ]
    }
}

/// Runs the ordered transform steps inside the transform project directory.
#[derive(Debug, Clone)]
pub struct TransformStage {
    program: String,
    project_dir: PathBuf,
    steps: Vec<TransformStep>,
}

impl TransformStage {
    pub fn new(program: impl Into<String>, project_dir: impl Into<PathBuf>, steps: Vec<TransformStep>) -> Self {
        Self {
            program: program.into(),
            project_dir: project_dir.into(),
            steps,
        }
    }

    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.dbt_bin, &config.dbt_project_dir, TransformStep::dbt_defaults())
    }
}

#[async_trait]
impl UnitOfWork for TransformStage {
    async fn execute(&self, _inputs: &[StageOutput]) -> Result<StageOutput, StageError> {
        let mut diagnostics = String::new();
        let mut advisory_failures = Vec::new();

        for step in &self.steps {
            let spec = CommandSpec::new(&self.program)
                .args(step.args.iter().cloned())
                .current_dir(&self.project_dir);

            match run_command(&step.name, &spec).await {
                Ok(output) => {
                    let _ = writeln!(diagnostics, "[{}] ok", step.name);
                    let text = output.combined();
                    if !text.is_empty() {
                        let _ = writeln!(diagnostics, "{text}");
                    }
                }
                Err(e) if step.advisory => {
                    tracing::warn!(step = %step.name, error = %e, "validation step failed; continuing");
                    let _ = writeln!(diagnostics, "[{}] failed (advisory): {e}", step.name);
                    let detail = e.diagnostics();
                    if !detail.is_empty() {
                        let _ = writeln!(diagnostics, "{detail}");
                    }
                    advisory_failures.push(step.name.clone());
                }
                Err(e) => return Err(e),
            }
        }

        let message = if advisory_failures.is_empty() {
            "transform completed".to_string()
        } else {
            format!(
                "transform completed with validation warnings: {}",
                advisory_failures.join(", ")
            )
        };
        Ok(StageOutput::success(message, diagnostics.trim_end()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::StageStatus;

    #[test]
    fn dbt_defaults_build_staging_before_marts() {
        let steps = TransformStep::dbt_defaults();
        let names: Vec<_> = steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["deps", "run staging", "run marts", "test"]);
        assert!(steps.iter().filter(|s| s.advisory).all(|s| s.name == "test"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_validation_step_is_advisory() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = TransformStage::new(
            "sh",
            tmp.path(),
            vec![
                TransformStep::new("build", ["-c", "echo built"], false),
                TransformStep::new("test", ["-c", "echo 2 tests failed >&2; exit 1"], true),
            ],
        );

        let output = stage.execute(&[]).await.unwrap();
        assert_eq!(output.status, StageStatus::Success);
        assert!(output.message.contains("validation warnings: test"));
        assert!(output.diagnostics.contains("2 tests failed"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_build_step_stops_the_transform() {
        let tmp = tempfile::tempdir().unwrap();
        let marker = tmp.path().join("after");
        let stage = TransformStage::new(
            "sh",
            tmp.path(),
            vec![
                TransformStep::new("run staging", ["-c", "exit 1"], false),
                TransformStep::new("run marts", ["-c", "touch after"], false),
            ],
        );

        let err = stage.execute(&[]).await.unwrap_err();
        assert!(matches!(err, StageError::NonZeroExit { ref step, .. } if step == "run staging"));
        assert!(!marker.exists(), "marts must not build after staging failed");
    }

    #[tokio::test]
    async fn missing_project_dir_fails_transform() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = TransformStage::new("dbt", tmp.path().join("absent"), TransformStep::dbt_defaults());
        let err = stage.execute(&[]).await.unwrap_err();
        assert!(matches!(err, StageError::MissingResource(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_stage_reports_captured_output() {
        let stage = CommandStage::new("scrape", CommandSpec::new("sh").args(["-c", "echo scraped 12"]));
        let output = stage.execute(&[]).await.unwrap();
        assert_eq!(output.message, "scrape completed");
        assert_eq!(output.diagnostics, "scraped 12");
    }
}
