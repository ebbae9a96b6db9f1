//! Recurring pipeline runs.

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::orchestrator::{Pipeline, Trigger};

/// Builds and starts a scheduler that runs `pipeline` on `cron` (six-field,
/// seconds first, UTC).
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process. Dropping it shuts down the schedule.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if `cron` does not parse or the scheduler
/// cannot be started.
pub async fn build_scheduler(
    pipeline: Arc<Pipeline>,
    cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let pipeline = Arc::clone(&pipeline);

        Box::pin(async move {
            tracing::info!("scheduler: starting pipeline run");
            let report = pipeline.run(Trigger::Scheduled).await;
            match report.failed_stage() {
                None => tracing::info!(run_id = %report.run_id, "scheduler: pipeline run complete"),
                Some(failed) => tracing::error!(
                    run_id = %report.run_id,
                    stage = %failed.stage,
                    diagnostics = %failed.output.diagnostics,
                    "scheduler: pipeline run failed"
                ),
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;
    tracing::info!(cron = %cron, "scheduler: registered pipeline job");
    Ok(scheduler)
}
