//! Dependency-ordered execution of the pipeline stages.
//!
//! Stages are grouped into waves: a stage's wave is one past the deepest of
//! its dependencies. Stages within a wave are independent of each other and
//! may run concurrently. The first wave containing a failure ends the run;
//! every stage that has not started by then is reported as skipped.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use medwh_core::AppConfig;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::stage::{StageError, StageId, StageOutput, StageStatus, UnitOfWork};
use crate::stages::{CommandStage, DetectAndLoadStage, LoadRawStage, TransformStage};

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Manual,
    Scheduled,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Trigger::Manual => "manual",
            Trigger::Scheduled => "scheduled",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub stage: StageId,
    pub output: StageOutput,
    /// `None` for skipped stages.
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// The outcome of one pipeline run. Lives only as long as the caller keeps
/// it; nothing here is persisted.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub trigger: Trigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One record per stage, in [`StageId::ALL`] order.
    pub stages: Vec<StageRecord>,
}

impl RunReport {
    /// The first stage (in graph order) that failed, if any.
    #[must_use]
    pub fn failed_stage(&self) -> Option<&StageRecord> {
        self.stages
            .iter()
            .find(|r| r.output.status == StageStatus::Failure)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.stages.iter().all(|r| r.output.is_success())
    }

    #[must_use]
    pub fn stage(&self, stage: StageId) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::StageFailed`] describing the first failed
    /// stage.
    pub fn into_result(self) -> Result<RunReport, PipelineError> {
        let failure = self.failed_stage().map(|record| PipelineError::StageFailed {
            stage: record.stage,
            message: record.output.message.clone(),
            diagnostics: record.output.diagnostics.clone(),
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("stage '{stage}' failed: {message}")]
    StageFailed {
        stage: StageId,
        message: String,
        diagnostics: String,
    },
}

/// The four-stage graph with one unit of work bound to each stage.
#[derive(Clone)]
pub struct Pipeline {
    units: BTreeMap<StageId, Arc<dyn UnitOfWork>>,
    parallel: bool,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.units.keys().collect::<Vec<_>>())
            .field("parallel", &self.parallel)
            .finish()
    }
}

impl Pipeline {
    /// An empty pipeline; bind units with [`Pipeline::with_stage`].
    #[must_use]
    pub fn new(parallel: bool) -> Self {
        Self {
            units: BTreeMap::new(),
            parallel,
        }
    }

    /// Run independent stages of a wave concurrently.
    #[must_use]
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    #[must_use]
    pub fn with_stage(mut self, stage: StageId, unit: Arc<dyn UnitOfWork>) -> Self {
        self.units.insert(stage, unit);
        self
    }

    /// The standard pipeline: scrape command, raw loader, detector plus
    /// detection loader, transform steps.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::MissingResource`] if a stage command is blank.
    pub fn from_config(pool: PgPool, config: &AppConfig) -> Result<Self, StageError> {
        Ok(Self::new(config.parallel_loaders)
            .with_stage(StageId::Scrape, Arc::new(CommandStage::scrape(config)?))
            .with_stage(
                StageId::LoadRaw,
                Arc::new(LoadRawStage::new(
                    pool.clone(),
                    &config.messages_dir,
                    config.loader_config(),
                )),
            )
            .with_stage(
                StageId::DetectAndLoad,
                Arc::new(DetectAndLoadStage::from_config(pool, config)?),
            )
            .with_stage(
                StageId::Transform,
                Arc::new(TransformStage::from_config(config)),
            ))
    }

    /// Stages grouped into dependency waves, each wave in [`StageId::ALL`]
    /// order.
    #[must_use]
    pub fn waves() -> Vec<Vec<StageId>> {
        let mut depth: BTreeMap<StageId, usize> = BTreeMap::new();
        for stage in StageId::ALL {
            let d = stage
                .dependencies()
                .iter()
                .filter_map(|dep| depth.get(dep))
                .max()
                .map_or(0, |deepest| deepest + 1);
            depth.insert(stage, d);
        }

        let wave_count = depth.values().max().map_or(0, |d| d + 1);
        let mut waves = vec![Vec::new(); wave_count];
        for stage in StageId::ALL {
            if let Some(&d) = depth.get(&stage) {
                waves[d].push(stage);
            }
        }
        waves
    }

    /// Execute one run of the graph.
    ///
    /// Never returns early with an error: failures are recorded on the
    /// report. Use [`RunReport::into_result`] to turn a failed run into a
    /// [`PipelineError`].
    pub async fn run(&self, trigger: Trigger) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(%run_id, %trigger, parallel = self.parallel, "pipeline run starting");

        let mut finished: BTreeMap<StageId, StageRecord> = BTreeMap::new();
        let mut blocked_by: Option<StageId> = None;

        for wave in Self::waves() {
            if let Some(failed) = blocked_by {
                for stage in wave {
                    finished.insert(stage, skipped(stage, failed));
                }
                continue;
            }

            let records = if self.parallel {
                join_all(wave.iter().map(|&stage| self.run_stage(run_id, stage, &finished))).await
            } else {
                let mut records = Vec::with_capacity(wave.len());
                for &stage in &wave {
                    if let Some(failed) = blocked_by {
                        records.push(skipped(stage, failed));
                        continue;
                    }
                    let record = self.run_stage(run_id, stage, &finished).await;
                    if !record.output.is_success() {
                        blocked_by = Some(stage);
                    }
                    records.push(record);
                }
                records
            };

            for record in records {
                if record.output.status == StageStatus::Failure && blocked_by.is_none() {
                    blocked_by = Some(record.stage);
                }
                finished.insert(record.stage, record);
            }
        }

        let report = RunReport {
            run_id,
            trigger,
            started_at,
            finished_at: Utc::now(),
            stages: StageId::ALL
                .iter()
                .filter_map(|stage| finished.remove(stage))
                .collect(),
        };

        match report.failed_stage() {
            None => tracing::info!(%run_id, %trigger, "pipeline run succeeded"),
            Some(failed) => tracing::error!(
                %run_id,
                %trigger,
                stage = %failed.stage,
                message = %failed.output.message,
                "pipeline run failed"
            ),
        }
        report
    }

    async fn run_stage(
        &self,
        run_id: Uuid,
        stage: StageId,
        finished: &BTreeMap<StageId, StageRecord>,
    ) -> StageRecord {
        let started_at = Utc::now();

        let inputs: Vec<StageOutput> = stage
            .dependencies()
            .iter()
            .filter_map(|dep| finished.get(dep).map(|r| r.output.clone()))
            .collect();

        let output = match self.units.get(&stage) {
            None => StageOutput::failure(format!("no unit of work bound to '{stage}'"), ""),
            Some(unit) => {
                tracing::info!(%run_id, %stage, "stage starting");
                match unit.execute(&inputs).await {
                    Ok(output) => output,
                    Err(e) => StageOutput::failure(e.to_string(), e.diagnostics()),
                }
            }
        };

        let finished_at = Utc::now();
        let elapsed_ms = (finished_at - started_at).num_milliseconds();
        if output.is_success() {
            tracing::info!(%run_id, %stage, elapsed_ms, message = %output.message, "stage succeeded");
        } else {
            tracing::error!(%run_id, %stage, elapsed_ms, message = %output.message, "stage failed");
        }

        StageRecord {
            stage,
            output,
            started_at: Some(started_at),
            finished_at: Some(finished_at),
        }
    }
}

fn skipped(stage: StageId, blocked_by: StageId) -> StageRecord {
    StageRecord {
        stage,
        output: StageOutput::skipped(blocked_by),
        started_at: None,
        finished_at: None,
    }
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
