//! Stage identity, results and the unit-of-work seam.
//!
//! The orchestrator only sees [`UnitOfWork`]; whether a stage shells out,
//! calls a loader in-process or does something else is up to the
//! implementation.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use medwh_ingest::IngestError;

/// Longest stderr tail kept in a [`StageError::NonZeroExit`].
const STDERR_TAIL_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Scrape,
    LoadRaw,
    DetectAndLoad,
    Transform,
}

impl StageId {
    pub const ALL: [StageId; 4] = [
        StageId::Scrape,
        StageId::LoadRaw,
        StageId::DetectAndLoad,
        StageId::Transform,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StageId::Scrape => "scrape",
            StageId::LoadRaw => "load_raw",
            StageId::DetectAndLoad => "detect_and_load",
            StageId::Transform => "transform",
        }
    }

    /// Stages that must succeed before this one may start.
    #[must_use]
    pub fn dependencies(self) -> &'static [StageId] {
        match self {
            StageId::Scrape => &[],
            StageId::LoadRaw | StageId::DetectAndLoad => &[StageId::Scrape],
            StageId::Transform => &[StageId::LoadRaw, StageId::DetectAndLoad],
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Failure,
    /// Never started because an earlier stage failed.
    Skipped,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StageStatus::Success => "success",
            StageStatus::Failure => "failure",
            StageStatus::Skipped => "skipped",
        })
    }
}

/// What a stage hands to its dependents and to the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageOutput {
    pub status: StageStatus,
    pub message: String,
    /// Captured stdout/stderr or loader counts; free-form.
    pub diagnostics: String,
}

impl StageOutput {
    pub fn success(message: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Success,
            message: message.into(),
            diagnostics: diagnostics.into(),
        }
    }

    pub fn failure(message: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Failure,
            message: message.into(),
            diagnostics: diagnostics.into(),
        }
    }

    #[must_use]
    pub fn skipped(blocked_by: StageId) -> Self {
        Self {
            status: StageStatus::Skipped,
            message: format!("not started: {blocked_by} failed"),
            diagnostics: String::new(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Success
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error("missing required resource: {0}")]
    MissingResource(String),

    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("step '{step}' exited with {}", describe_exit(.code))]
    NonZeroExit {
        step: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{0}")]
    Failed(String),
}

impl StageError {
    /// Captured text worth showing alongside the error message.
    #[must_use]
    pub fn diagnostics(&self) -> String {
        match self {
            StageError::NonZeroExit { stderr, .. } => stderr.clone(),
            _ => String::new(),
        }
    }

    pub(crate) fn non_zero_exit(step: &str, code: Option<i32>, stderr: &str) -> Self {
        StageError::NonZeroExit {
            step: step.to_string(),
            code,
            stderr: tail(stderr, STDERR_TAIL_BYTES).to_string(),
        }
    }
}

impl From<IngestError> for StageError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::SourceMissing { path } => {
                StageError::MissingResource(path.display().to_string())
            }
            other => StageError::Failed(other.to_string()),
        }
    }
}

/// One executable node of the pipeline graph.
///
/// `inputs` holds the outputs of the stage's direct dependencies, in the
/// order returned by [`StageId::dependencies`]. Returning `Err` fails the
/// stage and aborts everything that depends on it.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn execute(&self, inputs: &[StageOutput]) -> Result<StageOutput, StageError>;
}

fn describe_exit(code: &Option<i32>) -> String {
    code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}"))
}

/// Last `max` bytes of `text`, cut on a char boundary.
fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_edges() {
        assert!(StageId::Scrape.dependencies().is_empty());
        assert_eq!(StageId::LoadRaw.dependencies(), &[StageId::Scrape]);
        assert_eq!(StageId::DetectAndLoad.dependencies(), &[StageId::Scrape]);
        assert_eq!(
            StageId::Transform.dependencies(),
            &[StageId::LoadRaw, StageId::DetectAndLoad]
        );
    }

    #[test]
    fn loaders_do_not_depend_on_each_other() {
        assert!(!StageId::LoadRaw
            .dependencies()
            .contains(&StageId::DetectAndLoad));
        assert!(!StageId::DetectAndLoad
            .dependencies()
            .contains(&StageId::LoadRaw));
    }

    #[test]
    fn missing_source_maps_to_missing_resource() {
        let err: StageError = IngestError::SourceMissing {
            path: "data/raw/telegram_messages".into(),
        }
        .into();
        assert!(matches!(err, StageError::MissingResource(ref p) if p == "data/raw/telegram_messages"));
    }

    #[test]
    fn non_zero_exit_keeps_stderr_tail() {
        let long = format!("{}END", "x".repeat(10_000));
        let err = StageError::non_zero_exit("dbt run", Some(2), &long);
        let diag = err.diagnostics();
        assert_eq!(diag.len(), STDERR_TAIL_BYTES);
        assert!(diag.ends_with("END"));
        assert_eq!(err.to_string(), "step 'dbt run' exited with status 2");
    }

    #[test]
    fn tail_respects_char_boundaries() {
        assert_eq!(tail("héllo", 4), "llo");
        assert_eq!(tail("abc", 10), "abc");
    }

    #[test]
    fn stage_names() {
        let names: Vec<_> = StageId::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(names, ["scrape", "load_raw", "detect_and_load", "transform"]);
    }
}
