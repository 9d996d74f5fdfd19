//! The per-task state machine.
//!
//! Drives one task through understand -> design -> generate, then the
//! bounded execute/diagnose/repair loop, and always hands back a
//! terminal `TaskRun`. Collaborator failures are absorbed into the
//! run's status; the machine itself never errors out.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{DEFAULT_MAX_ITERATIONS, DEFAULT_TIMEOUT_SECS};
use crate::core::{FailureKind, IterationRecord, TaskRun, TaskSpec};
use crate::history::HistoryRecorder;
use crate::phases::{self, Backend};
use crate::run::phase::{Phase, PhaseState};
use crate::sandbox::{ExecutionReport, Executor};
use crate::{flog, flog_debug, flog_error, flog_warn};

/// Per-run limits.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Repair budget: total execution attempts = this + 1.
    pub max_iterations: u32,
    /// Sandbox time limit per execution attempt.
    pub timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// State machine for one task run.
pub struct TaskMachine {
    spec: TaskSpec,
    backend: Arc<dyn Backend>,
    executor: Arc<dyn Executor>,
    recorder: Arc<dyn HistoryRecorder>,
    options: RunOptions,
    run: TaskRun,
    phases: PhaseState,
}

impl TaskMachine {
    pub fn new(
        spec: TaskSpec,
        backend: Arc<dyn Backend>,
        executor: Arc<dyn Executor>,
        recorder: Arc<dyn HistoryRecorder>,
        options: RunOptions,
    ) -> Self {
        let run = TaskRun::new(spec.id.clone());
        Self {
            spec,
            backend,
            executor,
            recorder,
            options,
            run,
            phases: PhaseState::new(),
        }
    }

    /// Drive the task to a terminal state.
    ///
    /// Always returns the run; every failure mode is folded into its
    /// status. Exactly one iteration record exists per executing-phase
    /// entry.
    pub async fn run(mut self) -> TaskRun {
        self.run.start();
        flog!("task {} started", self.spec.id);

        // The straight-line generation pipeline. Any backend error here
        // is fatal for the task with no retry.
        let analysis = match phases::understanding::understand(
            self.backend.as_ref(),
            &self.spec.description,
        )
        .await
        {
            Ok(analysis) => analysis,
            Err(e) => return self.fail_backend(e.to_string()),
        };

        self.advance(Phase::Designing);
        let blueprint = match phases::design::design(self.backend.as_ref(), &analysis).await {
            Ok(blueprint) => blueprint,
            Err(e) => return self.fail_backend(e.to_string()),
        };

        self.advance(Phase::Programming);
        let mut code =
            match phases::programming::generate_code(self.backend.as_ref(), &blueprint).await {
                Ok(artifact) => artifact.code,
                Err(e) => return self.fail_backend(e.to_string()),
            };

        // The bounded repair loop: attempt 0 is the original artifact,
        // each further attempt a repaired one.
        for attempt in 0..=self.options.max_iterations {
            self.advance(Phase::Executing);
            let report = self.execute(&code).await;

            if report.success {
                let record = IterationRecord::new(attempt, code.clone(), report, None);
                self.recorder.append(&self.spec.id, &record);
                self.run.push_iteration(record);
                self.advance(Phase::Succeeded);
                self.run.succeed(code);
                flog!(
                    "task {} succeeded after {} attempt(s)",
                    self.spec.id,
                    attempt + 1
                );
                return self.run;
            }

            self.advance(Phase::Diagnosing);
            let diagnosis =
                match phases::diagnosis::diagnose(self.backend.as_ref(), &code, &report).await {
                    Ok(diagnosis) => Some(diagnosis),
                    Err(e) => {
                        // A failed diagnosis degrades the record, not the task.
                        flog_warn!("task {}: diagnosis failed: {}", self.spec.id, e);
                        None
                    }
                };
            let record = IterationRecord::new(attempt, code.clone(), report.clone(), diagnosis);
            self.recorder.append(&self.spec.id, &record);
            self.run.push_iteration(record);

            if attempt == self.options.max_iterations {
                self.advance(Phase::Failed);
                self.run.fail(FailureKind::IterationLimitExceeded {
                    attempts: attempt + 1,
                });
                flog!(
                    "task {} failed: iteration limit exceeded after {} attempts",
                    self.spec.id,
                    attempt + 1
                );
                return self.run;
            }

            self.advance(Phase::Repairing);
            let diagnosis_ref = self
                .run
                .iterations()
                .last()
                .and_then(|r| r.diagnosis.clone());
            code = match phases::repair::repair(
                self.backend.as_ref(),
                &code,
                diagnosis_ref.as_deref(),
                &report,
                self.run.iterations(),
            )
            .await
            {
                Ok(artifact) => artifact.code,
                Err(e) => return self.fail_backend(e.to_string()),
            };
        }

        // Unreachable: the loop returns on the final attempt.
        self.run
    }

    /// Run one sandbox attempt. Executor infrastructure errors become
    /// failed reports so they count against the budget like any other
    /// failed attempt.
    async fn execute(&self, code: &str) -> ExecutionReport {
        match self
            .executor
            .execute(code, self.spec.test_call.as_deref(), self.options.timeout)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                flog_warn!("task {}: executor error: {}", self.spec.id, e);
                ExecutionReport::raised(e.to_string(), 0)
            }
        }
    }

    fn fail_backend(mut self, message: String) -> TaskRun {
        self.advance(Phase::Failed);
        self.run.fail(FailureKind::Backend {
            message: message.clone(),
        });
        flog!("task {} failed: {}", self.spec.id, message);
        self.run
    }

    /// Move to the next phase, mirroring it onto the run.
    ///
    /// Transitions are driven by the loop above, so an illegal one is a
    /// bug; it is logged and the phase forced rather than panicking
    /// mid-batch.
    fn advance(&mut self, target: Phase) {
        if let Err(e) = self.phases.transition(target) {
            flog_error!("task {}: {}", self.spec.id, e);
        }
        self.run.phase = self.phases.current();
        flog_debug!("task {} phase -> {}", self.spec.id, target);
    }
}
