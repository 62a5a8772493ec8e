//! External process execution.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use ferrodock_common::error::{PipelineError, Result};

/// A fully-resolved command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory; inherits the parent's when `None`
    pub cwd: Option<PathBuf>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &std::path::Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of a finished process.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Something that can run a [`ToolInvocation`].
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolOutcome>;
}

/// Launches real processes with `tokio::process`.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    /// Treat a non-zero exit as `ToolInvocationFailed`
    check_exit: bool,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self { check_exit: true }
    }
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept any exit status; tools that report failure only in their own
    /// logs are then judged by their output artifacts alone.
    pub fn lenient() -> Self {
        Self { check_exit: false }
    }
}

const STDERR_TAIL_CHARS: usize = 400;

fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        text.trim().to_string()
    } else {
        text.chars().skip(count - max_chars).collect::<String>().trim().to_string()
    }
}

#[async_trait]
impl ToolExecutor for ProcessExecutor {
    async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolOutcome> {
        info!("Running {}", invocation.display());
        let start = Instant::now();

        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args).kill_on_drop(true);
        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }

        let output = command
            .output()
            .await
            .map_err(|e| PipelineError::ToolInvocationFailed {
                program: invocation.program.clone(),
                exit_code: None,
                reason: format!("failed to launch: {e}"),
            })?;

        let outcome = ToolOutcome {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            elapsed: start.elapsed(),
        };

        if self.check_exit && !output.status.success() {
            return Err(PipelineError::ToolInvocationFailed {
                program: invocation.program.clone(),
                exit_code: outcome.exit_code,
                reason: format!("{}: {}", output.status, tail(&outcome.stderr, STDERR_TAIL_CHARS)),
            });
        }

        debug!(
            "{} finished in {:.1}s (exit {:?})",
            invocation.program,
            outcome.elapsed.as_secs_f64(),
            outcome.exit_code
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_builder() {
        let inv = ToolInvocation::new("adfr")
            .arg("-l")
            .path_arg(std::path::Path::new("lig_dock.pdbqt"))
            .args(["--seed", "8"])
            .current_dir("/tmp");
        assert_eq!(inv.display(), "adfr -l lig_dock.pdbqt --seed 8");
        assert_eq!(inv.cwd, Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn test_tail_keeps_end() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("  ab ", 10), "ab");
    }

    #[tokio::test]
    async fn test_successful_process() {
        let inv = ToolInvocation::new("sh").args(["-c", "echo docked"]);
        let outcome = ProcessExecutor::new().execute(&inv).await.unwrap();
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.stdout.trim(), "docked");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_tool_failure() {
        let inv = ToolInvocation::new("sh").args(["-c", "echo boom >&2; exit 3"]);
        match ProcessExecutor::new().execute(&inv).await {
            Err(PipelineError::ToolInvocationFailed { exit_code, reason, .. }) => {
                assert_eq!(exit_code, Some(3));
                assert!(reason.contains("boom"));
            }
            other => panic!("expected tool failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lenient_accepts_nonzero_exit() {
        let inv = ToolInvocation::new("sh").args(["-c", "exit 2"]);
        let outcome = ProcessExecutor::lenient().execute(&inv).await.unwrap();
        assert_eq!(outcome.exit_code, Some(2));
    }

    #[tokio::test]
    async fn test_missing_binary_is_tool_failure() {
        let inv = ToolInvocation::new("ferrodock-no-such-binary");
        let err = ProcessExecutor::new().execute(&inv).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ToolInvocationFailed { exit_code: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let inv = ToolInvocation::new("sh")
            .args(["-c", "touch marker"])
            .current_dir(dir.path());
        ProcessExecutor::new().execute(&inv).await.unwrap();
        assert!(dir.path().join("marker").exists());
    }
}
