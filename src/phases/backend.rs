//! Generation backend abstraction and the CLI-based default.
//!
//! The backend is an opaque prompt-to-text collaborator. Phase code
//! never inspects how text is produced; tests substitute scripted
//! implementations.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use crate::{flog_debug, flog_trace, Error, Result};

/// Which phase a generation request comes from.
///
/// Carried on every request so backends (and test doubles) can tell
/// phases apart without parsing prompt text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Understand,
    Design,
    Generate,
    Diagnose,
    Repair,
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestKind::Understand => write!(f, "understand"),
            RequestKind::Design => write!(f, "design"),
            RequestKind::Generate => write!(f, "generate"),
            RequestKind::Diagnose => write!(f, "diagnose"),
            RequestKind::Repair => write!(f, "repair"),
        }
    }
}

/// A single prompt-to-text request.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub kind: RequestKind,
    /// Role framing prepended to the prompt.
    pub system: String,
    /// The phase-specific prompt body.
    pub prompt: String,
}

impl GenerateRequest {
    pub fn new(kind: RequestKind, system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            kind,
            system: system.into(),
            prompt: prompt.into(),
        }
    }

    /// The full text sent to the backend.
    pub fn full_prompt(&self) -> String {
        if self.system.is_empty() {
            self.prompt.clone()
        } else {
            format!("{}\n\n{}", self.system, self.prompt)
        }
    }
}

/// Opaque text generation collaborator.
///
/// Any error from the backend is fatal for the requesting task; the
/// state machine does not retry backend failures.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<String>;
}

/// Backend that shells out to a headless CLI (e.g. `claude -p`).
pub struct CliBackend {
    binary: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

/// Default time limit for one backend invocation.
const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(300);

impl CliBackend {
    /// Locate the backend binary on PATH.
    ///
    /// The command may carry extra arguments ("claude --model opus");
    /// only the first word is resolved.
    pub fn discover(command: &str) -> Result<Self> {
        let mut words = command.split_whitespace();
        let name = words
            .next()
            .ok_or_else(|| Error::BackendNotFound("empty backend command".to_string()))?;
        let binary =
            which::which(name).map_err(|_| Error::BackendNotFound(name.to_string()))?;
        flog_debug!("CliBackend::discover resolved {} -> {}", name, binary.display());
        Ok(Self {
            binary,
            args: words.map(String::from).collect(),
            timeout: DEFAULT_BACKEND_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Backend for CliBackend {
    async fn generate(&self, request: GenerateRequest) -> Result<String> {
        let prompt = request.full_prompt();
        flog_debug!(
            "CliBackend::generate kind={} prompt_len={}",
            request.kind,
            prompt.len()
        );
        flog_trace!("CliBackend prompt: {}", prompt);

        let mut command = tokio::process::Command::new(&self.binary);
        command
            .args(&self.args)
            .arg("-p")
            .arg(&prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, async {
            command.output().await.map_err(Error::Io)
        })
        .await
        .map_err(|_| Error::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Backend(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        flog_trace!("CliBackend response: {}", text);
        Ok(text)
    }
}
