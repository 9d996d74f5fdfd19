//! Sandboxed execution of generated code.
//!
//! The executor runs a code artifact in a subprocess with a hard time
//! limit. When the limit expires the subprocess is killed; a timed-out
//! attempt never lingers past its report.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::{flog_debug, flog_trace, Result};

/// Raw outcome of one sandboxed execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// True when the process exited zero within the time limit.
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// The failure summary (last traceback line or exit status) when
    /// the attempt failed. Timeouts carry their own marker instead.
    pub exception: Option<String>,
    pub duration_ms: u64,
    /// True when the attempt was killed at the time limit. Distinct
    /// from an ordinary failure so callers can tell the two apart.
    pub timed_out: bool,
}

impl ExecutionReport {
    /// A successful attempt.
    pub fn succeeded(stdout: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
            exception: None,
            duration_ms,
            timed_out: false,
        }
    }

    /// A failed attempt with an exception summary.
    pub fn raised(exception: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            exception: Some(exception.into()),
            duration_ms,
            timed_out: false,
        }
    }

    /// An attempt killed at the time limit.
    pub fn expired(limit: Duration) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            exception: None,
            duration_ms: limit.as_millis() as u64,
            timed_out: true,
        }
    }
}

/// Sandboxed code executor.
///
/// Implementations must enforce the time limit with a hard cancel. An
/// `Err` means the executor itself broke (could not spawn, could not
/// write the artifact); an unsuccessful `ExecutionReport` means the
/// code under test failed.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        code: &str,
        test_call: Option<&str>,
        timeout: Duration,
    ) -> Result<ExecutionReport>;
}

/// Executor that runs artifacts through a Python interpreter subprocess.
pub struct ProcessSandbox {
    workspace: PathBuf,
    interpreter: PathBuf,
}

impl ProcessSandbox {
    pub fn new(workspace: PathBuf, interpreter: PathBuf) -> Self {
        Self {
            workspace,
            interpreter,
        }
    }

    /// Write the artifact (with the test call appended, if any) to a
    /// uniquely named file in the workspace.
    async fn write_artifact(&self, code: &str, test_call: Option<&str>) -> Result<PathBuf> {
        let mut source = code.to_string();
        if let Some(call) = test_call {
            // Evaluated after the module body; a raising test call
            // fails the attempt just like a raising module body.
            source.push_str(&format!("\n\nprint({})\n", call));
        }
        let path = self.workspace.join(format!("artifact-{}.py", Uuid::new_v4()));
        tokio::fs::create_dir_all(&self.workspace).await?;
        tokio::fs::write(&path, source).await?;
        Ok(path)
    }
}

#[async_trait]
impl Executor for ProcessSandbox {
    async fn execute(
        &self,
        code: &str,
        test_call: Option<&str>,
        timeout: Duration,
    ) -> Result<ExecutionReport> {
        let path = self.write_artifact(code, test_call).await?;
        flog_debug!(
            "ProcessSandbox::execute artifact={} timeout={:?}",
            path.display(),
            timeout
        );

        let start = Instant::now();
        let mut command = tokio::process::Command::new(&self.interpreter);
        command
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn()?;
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                // Dropping the wait future kills the child (kill_on_drop).
                flog_debug!("ProcessSandbox::execute timed out after {:?}", timeout);
                let _ = tokio::fs::remove_file(&path).await;
                return Ok(ExecutionReport::expired(timeout));
            }
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let _ = tokio::fs::remove_file(&path).await;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        flog_trace!("ProcessSandbox stdout: {}", stdout);
        flog_trace!("ProcessSandbox stderr: {}", stderr);

        if output.status.success() {
            Ok(ExecutionReport {
                success: true,
                stdout,
                stderr,
                exception: None,
                duration_ms,
                timed_out: false,
            })
        } else {
            let exception = last_traceback_line(&stderr)
                .unwrap_or_else(|| format!("process exited with {}", output.status));
            Ok(ExecutionReport {
                success: false,
                stdout,
                stderr,
                exception: Some(exception),
                duration_ms,
                timed_out: false,
            })
        }
    }
}

/// The final line of a Python traceback, e.g. "NameError: name 'x' is not defined".
fn last_traceback_line(stderr: &str) -> Option<String> {
    stderr
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim().to_string())
}
