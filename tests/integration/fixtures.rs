//! Scripted collaborators for integration tests.
//!
//! Tasks are identified by short keys embedded in their descriptions;
//! the scripted backend echoes the key into generated code, and the
//! scripted executor keys its outcome sequence off that code. This
//! lets one backend/executor pair drive many concurrent tasks
//! deterministically.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use forge::core::{TaskId, TaskSpec};
use forge::phases::{Backend, GenerateRequest, RequestKind};
use forge::sandbox::{ExecutionReport, Executor};
use forge::{Error, Result};

/// Build a spec whose description embeds its own id as the key.
pub fn task(id: &str) -> TaskSpec {
    TaskSpec::new(id, format!("task [{}] does something", id))
}

pub fn task_deps(id: &str, deps: &[&str]) -> TaskSpec {
    task(id).with_dependencies(deps.iter().map(|d| TaskId::new(*d)).collect())
}

/// Backend that generates `# key: <key>` artifacts and counts calls.
///
/// Repair responses append an attempt marker so each repaired artifact
/// is distinct from its predecessor.
pub struct ScriptedBackend {
    keys: Vec<String>,
    calls: AtomicUsize,
    fail_on: Option<RequestKind>,
}

impl ScriptedBackend {
    pub fn new(keys: &[&str]) -> Self {
        Self {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            calls: AtomicUsize::new(0),
            fail_on: None,
        }
    }

    pub fn failing_on(keys: &[&str], kind: RequestKind) -> Self {
        let mut backend = Self::new(keys);
        backend.fail_on = Some(kind);
        backend
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn key_in(&self, text: &str) -> String {
        self.keys
            .iter()
            .find(|k| text.contains(&format!("[{}]", k)))
            .cloned()
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn generate(&self, request: GenerateRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on == Some(request.kind) {
            return Err(Error::Backend("scripted backend failure".to_string()));
        }
        let key = self.key_in(&request.prompt);
        match request.kind {
            // Analysis and design echo the key so downstream prompts
            // keep carrying it.
            RequestKind::Understand => Ok(format!("analysis of [{}]", key)),
            RequestKind::Design => Ok(format!("design of [{}]", key)),
            RequestKind::Generate => Ok(format!("```python\n# key: [{}]\nx = 1\n```", key)),
            RequestKind::Diagnose => Ok(format!("diagnosis for [{}]", key)),
            RequestKind::Repair => Ok(format!(
                "```python\n# key: [{}] repaired\nx = 1\n```",
                key
            )),
        }
    }
}

/// One scripted execution outcome.
#[derive(Debug, Clone, Copy)]
pub enum ExecOutcome {
    Pass,
    Fail,
    Timeout,
    /// Pass, but only after sleeping. Used to hold a task in flight.
    SlowPass(u64),
}

/// Executor with a per-key outcome sequence.
///
/// Outcomes are consumed in order per key; a key with an exhausted (or
/// missing) script passes.
#[derive(Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, Vec<ExecOutcome>>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, key: &str, outcomes: &[ExecOutcome]) -> Self {
        {
            let mut scripts = self.scripts.lock().unwrap();
            // Stored reversed so pop() yields outcomes in order.
            scripts.insert(key.to_string(), outcomes.iter().rev().copied().collect());
        }
        self
    }

    fn next_outcome(&self, code: &str) -> ExecOutcome {
        let mut scripts = self.scripts.lock().unwrap();
        for (key, outcomes) in scripts.iter_mut() {
            if code.contains(&format!("[{}]", key)) {
                return outcomes.pop().unwrap_or(ExecOutcome::Pass);
            }
        }
        ExecOutcome::Pass
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(
        &self,
        code: &str,
        _test_call: Option<&str>,
        timeout: Duration,
    ) -> Result<ExecutionReport> {
        match self.next_outcome(code) {
            ExecOutcome::Pass => Ok(ExecutionReport::succeeded("ok\n", 1)),
            ExecOutcome::Fail => Ok(ExecutionReport::raised("AssertionError: wrong", 1)),
            ExecOutcome::Timeout => Ok(ExecutionReport::expired(timeout)),
            ExecOutcome::SlowPass(ms) => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(ExecutionReport::succeeded("ok\n", ms))
            }
        }
    }
}
