//! External command execution for stages backed by a process.

use std::path::PathBuf;

use tokio::process::Command;

use crate::stage::StageError;

/// A program invocation: program, arguments, extra environment and working
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            current_dir: None,
        }
    }

    /// Split a configured command line on whitespace. Returns `None` for a
    /// blank line.
    #[must_use]
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next()?;
        Some(Self {
            args: parts.map(str::to_string).collect(),
            ..Self::new(program)
        })
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Human-readable command line for logs.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// stdout and stderr combined for stage diagnostics.
    #[must_use]
    pub fn combined(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            ("", "") => String::new(),
            (out, "") => out.to_string(),
            ("", err) => err.to_string(),
            (out, err) => format!("{out}\n{err}"),
        }
    }
}

/// Run `spec` to completion, capturing both streams.
///
/// `step` names the invocation in errors.
///
/// # Errors
///
/// - [`StageError::MissingResource`] if the program or working directory does
///   not exist.
/// - [`StageError::Spawn`] if the process cannot be started for another reason.
/// - [`StageError::NonZeroExit`] if it exits unsuccessfully; the error carries
///   the tail of stderr (stdout if stderr is empty).
pub async fn run_command(step: &str, spec: &CommandSpec) -> Result<CommandOutput, StageError> {
    if let Some(dir) = &spec.current_dir {
        if !dir.is_dir() {
            return Err(StageError::MissingResource(format!(
                "working directory {} for '{step}'",
                dir.display()
            )));
        }
    }

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args).kill_on_drop(true);
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }
    if let Some(dir) = &spec.current_dir {
        cmd.current_dir(dir);
    }

    tracing::info!(step, command = %spec.display(), "running command");
    let output = cmd.output().await.map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            StageError::MissingResource(format!("program '{}' for '{step}'", spec.program))
        } else {
            StageError::Spawn {
                program: spec.program.clone(),
                source,
            }
        }
    })?;

    let captured = CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    if output.status.success() {
        tracing::debug!(step, "command succeeded");
        Ok(captured)
    } else {
        let detail = if captured.stderr.trim().is_empty() {
            &captured.stdout
        } else {
            &captured.stderr
        };
        tracing::warn!(step, code = ?output.status.code(), "command failed");
        Err(StageError::non_zero_exit(step, output.status.code(), detail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_on_whitespace() {
        let spec = CommandSpec::parse("  python  scripts/scraper.py --limit 100 ").unwrap();
        assert_eq!(spec.program, "python");
        assert_eq!(spec.args, ["scripts/scraper.py", "--limit", "100"]);
        assert_eq!(spec.display(), "python scripts/scraper.py --limit 100");
    }

    #[test]
    fn parse_blank_is_none() {
        assert!(CommandSpec::parse("   ").is_none());
    }

    #[test]
    fn combined_output_skips_empty_streams() {
        let out = CommandOutput {
            stdout: "done\n".to_string(),
            stderr: String::new(),
        };
        assert_eq!(out.combined(), "done");
    }

    #[tokio::test]
    async fn missing_program_is_a_missing_resource() {
        let spec = CommandSpec::new("medwh-definitely-not-installed");
        let err = run_command("probe", &spec).await.unwrap_err();
        assert!(matches!(err, StageError::MissingResource(_)));
    }

    #[tokio::test]
    async fn missing_working_directory_is_a_missing_resource() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("true").current_dir(tmp.path().join("absent"));
        let err = run_command("probe", &spec).await.unwrap_err();
        assert!(matches!(err, StageError::MissingResource(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_output_and_env() {
        let spec = CommandSpec::new("sh")
            .args(["-c", "echo \"$MEDWH_PROBE\"; echo warn >&2"])
            .env("MEDWH_PROBE", "hello");
        let out = run_command("probe", &spec).await.unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "warn");
        assert_eq!(out.combined(), "hello\nwarn");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_carries_code_and_stderr() {
        let spec = CommandSpec::new("sh").args(["-c", "echo boom >&2; exit 3"]);
        let err = run_command("probe", &spec).await.unwrap_err();
        match err {
            StageError::NonZeroExit { step, code, stderr } => {
                assert_eq!(step, "probe");
                assert_eq!(code, Some(3));
                assert_eq!(stderr.trim(), "boom");
            }
            other => panic!("expected NonZeroExit, got {other:?}"),
        }
    }
}
