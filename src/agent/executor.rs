//! Time-bounded execution of candidate programs
//!
//! Each attempt is written to a fixed filename inside the working directory
//! (overwriting the previous attempt) and run as a child process with that
//! directory as its cwd. The child is a plain process, not a jail.
//!
//! The external contract never fails hard: launch failures and timeouts are
//! folded into a synthetic stderr so the agent loop can feed them back to the
//! generator like any other error.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::metrics::{CODE_EXECUTIONS, CODE_EXECUTION_DURATION};

/// Captured result of one execution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionOutcome {
    pub stdout: String,
    pub stderr: String,
    /// Exit code when the child ran to completion
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub duration_ms: f64,
}

impl ExecutionOutcome {
    /// Build an outcome from just the two streams
    pub fn from_streams(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    /// Success is defined purely by an empty stderr
    pub fn is_success(&self) -> bool {
        self.stderr.is_empty()
    }

    fn synthetic_failure(message: String, duration_ms: f64) -> Self {
        Self {
            stdout: String::new(),
            stderr: message,
            exit_code: None,
            timed_out: false,
            duration_ms,
        }
    }
}

/// Runs a candidate program and reports what it printed.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, program: &str, working_dir: &Path) -> ExecutionOutcome;
}

/// Executes programs as local child processes
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    interpreter: String,
    script_filename: String,
    timeout: Duration,
}

impl ProcessExecutor {
    pub fn new(
        interpreter: impl Into<String>,
        script_filename: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            interpreter: interpreter.into(),
            script_filename: script_filename.into(),
            timeout,
        }
    }

    /// Path the candidate is written to for a given working directory
    pub fn script_path(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(&self.script_filename)
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn execute(&self, program: &str, working_dir: &Path) -> ExecutionOutcome {
        let start = Instant::now();
        let elapsed_ms = |start: Instant| start.elapsed().as_secs_f64() * 1000.0;

        let script_path = self.script_path(working_dir);
        if let Err(e) = tokio::fs::write(&script_path, program).await {
            warn!(path = %script_path.display(), error = %e, "Failed to write candidate script");
            CODE_EXECUTIONS.with_label_values(&["error"]).inc();
            return ExecutionOutcome::synthetic_failure(format!("Error: {}", e), elapsed_ms(start));
        }

        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(&self.script_filename)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the output future on timeout must take the child with it.
            .kill_on_drop(true);

        debug!(
            interpreter = %self.interpreter,
            script = %script_path.display(),
            code_len = program.len(),
            "Launching candidate"
        );

        let result = timeout(self.timeout, cmd.output()).await;
        let duration_ms = elapsed_ms(start);
        CODE_EXECUTION_DURATION.observe(duration_ms / 1000.0);

        match result {
            Ok(Ok(output)) => {
                let outcome = ExecutionOutcome {
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                    exit_code: output.status.code(),
                    timed_out: false,
                    duration_ms,
                };
                let status = if outcome.is_success() { "success" } else { "error" };
                CODE_EXECUTIONS.with_label_values(&[status]).inc();
                outcome
            }
            Ok(Err(e)) => {
                warn!(interpreter = %self.interpreter, error = %e, "Failed to launch candidate");
                CODE_EXECUTIONS.with_label_values(&["error"]).inc();
                ExecutionOutcome::synthetic_failure(format!("Error: {}", e), duration_ms)
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Candidate timed out");
                CODE_EXECUTIONS.with_label_values(&["timeout"]).inc();
                ExecutionOutcome {
                    timed_out: true,
                    ..ExecutionOutcome::synthetic_failure(
                        format!(
                            "Error: Code execution timed out after {} seconds.",
                            self.timeout.as_secs()
                        ),
                        duration_ms,
                    )
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh_executor(timeout: Duration) -> ProcessExecutor {
        ProcessExecutor::new("sh", "agent_script.sh", timeout)
    }

    #[tokio::test]
    async fn test_captures_stdout_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = sh_executor(Duration::from_secs(10))
            .execute("echo ok", dir.path())
            .await;
        assert_eq!(outcome.stdout, "ok\n");
        assert_eq!(outcome.stderr, "");
        assert_eq!(outcome.exit_code, Some(0));
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_captures_stderr_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = sh_executor(Duration::from_secs(10))
            .execute("echo partial\necho 'NameError: x' >&2\nexit 1", dir.path())
            .await;
        assert_eq!(outcome.stdout, "partial\n");
        assert_eq!(outcome.stderr, "NameError: x\n");
        assert_eq!(outcome.exit_code, Some(1));
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_runs_in_working_dir_and_leaves_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let executor = sh_executor(Duration::from_secs(10));
        let outcome = executor.execute("touch out.mp4", dir.path()).await;
        assert!(outcome.is_success());
        assert!(dir.path().join("out.mp4").exists());
        assert!(executor.script_path(dir.path()).exists());
    }

    #[tokio::test]
    async fn test_second_attempt_overwrites_script() {
        let dir = tempfile::tempdir().unwrap();
        let executor = sh_executor(Duration::from_secs(10));
        executor.execute("echo first", dir.path()).await;
        executor.execute("echo second", dir.path()).await;
        let script = std::fs::read_to_string(executor.script_path(dir.path())).unwrap();
        assert_eq!(script, "echo second");
    }

    #[tokio::test]
    async fn test_timeout_becomes_synthetic_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = sh_executor(Duration::from_millis(200))
            .execute("sleep 5", dir.path())
            .await;
        assert!(outcome.timed_out);
        assert_eq!(outcome.stdout, "");
        assert!(outcome.stderr.contains("timed out"));
        assert!(outcome.duration_ms < 5000.0);
    }

    #[tokio::test]
    async fn test_missing_interpreter_becomes_synthetic_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ProcessExecutor::new(
            "zerostick-no-such-interpreter",
            "agent_script.py",
            Duration::from_secs(5),
        );
        let outcome = executor.execute("print(1)", dir.path()).await;
        assert!(outcome.stderr.starts_with("Error: "));
        assert_eq!(outcome.exit_code, None);
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_missing_working_dir_becomes_synthetic_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let outcome = sh_executor(Duration::from_secs(5))
            .execute("echo hi", &missing)
            .await;
        assert!(outcome.stderr.starts_with("Error: "));
    }
}
