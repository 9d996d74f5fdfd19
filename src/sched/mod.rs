//! Dependency- and priority-aware batch scheduling.
//!
//! The scheduler validates the batch graph up front, then runs an
//! event-driven dispatch loop: ready tasks are started in priority
//! order up to the worker limit, completions arrive over a channel,
//! and failures propagate to dependents as skips. Cancellation stops
//! admission; in-flight tasks run to completion.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{DEFAULT_MAX_ITERATIONS, DEFAULT_TIMEOUT_SECS, DEFAULT_WORKERS};
use crate::core::{SkipCause, TaskGraph, TaskId, TaskRun, TaskSpec, TaskStatus};
use crate::history::HistoryRecorder;
use crate::phases::Backend;
use crate::run::{RunOptions, TaskMachine};
use crate::sandbox::Executor;
use crate::{flog, flog_debug, Result};

/// Progress events emitted while a batch runs.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    TaskStarted { task_id: TaskId },
    TaskFinished { task_id: TaskId, status: TaskStatus },
    TaskSkipped { task_id: TaskId, cause: SkipCause },
    BatchComplete,
}

/// Batch-level limits.
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    /// Maximum number of concurrently running tasks.
    pub workers: usize,
    /// Repair budget per task.
    pub max_iterations: u32,
    /// Sandbox time limit per execution attempt.
    pub timeout: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Outcome of a whole batch: one terminal run per input task.
#[derive(Debug)]
pub struct BatchResult {
    pub batch_id: Uuid,
    /// Terminal run for every task in the batch, keyed by id.
    pub runs: HashMap<TaskId, TaskRun>,
    /// Realized order: tasks in the order they started (or were
    /// decided skipped).
    pub order: Vec<TaskId>,
}

impl BatchResult {
    pub fn succeeded_count(&self) -> usize {
        self.runs
            .values()
            .filter(|r| r.status == TaskStatus::Succeeded)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.runs
            .values()
            .filter(|r| matches!(r.status, TaskStatus::Failed { .. }))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.runs
            .values()
            .filter(|r| matches!(r.status, TaskStatus::Skipped { .. }))
            .count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.runs
            .values()
            .all(|r| r.status == TaskStatus::Succeeded)
    }
}

/// Runs a validated batch to completion.
pub struct BatchScheduler {
    batch_id: Uuid,
    graph: TaskGraph,
    backend: Arc<dyn Backend>,
    executor: Arc<dyn Executor>,
    recorder: Arc<dyn HistoryRecorder>,
    options: BatchOptions,
    events: Option<mpsc::UnboundedSender<SchedulerEvent>>,
    cancel: CancellationToken,
}

impl BatchScheduler {
    /// Validate the batch and build a scheduler for it.
    ///
    /// Duplicate ids, unknown dependencies, and cycles reject the whole
    /// batch here, before any task runs.
    pub fn new(
        specs: Vec<TaskSpec>,
        backend: Arc<dyn Backend>,
        executor: Arc<dyn Executor>,
        recorder: Arc<dyn HistoryRecorder>,
        options: BatchOptions,
    ) -> Result<Self> {
        let graph = TaskGraph::from_specs(specs)?;
        Ok(Self {
            batch_id: Uuid::new_v4(),
            graph,
            backend,
            executor,
            recorder,
            options,
            events: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Subscribe a channel to scheduler progress events.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<SchedulerEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Token callers can trigger to cancel the batch. In-flight tasks
    /// finish; everything not yet started is skipped.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn emit(&self, event: SchedulerEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Run the batch to completion.
    ///
    /// Every input task ends in exactly one terminal state; the result
    /// covers the batch exactly once.
    pub async fn run(self) -> BatchResult {
        let topo = self.graph.execution_order();
        flog!(
            "batch {} started: {} task(s), {} worker(s)",
            self.batch_id,
            topo.len(),
            self.options.workers
        );

        let mut runs: HashMap<TaskId, TaskRun> = topo
            .iter()
            .map(|id| (id.clone(), TaskRun::new(id.clone())))
            .collect();
        let mut order: Vec<TaskId> = Vec::with_capacity(topo.len());
        let mut started: HashSet<TaskId> = HashSet::new();
        let mut succeeded: HashSet<TaskId> = HashSet::new();
        let mut settled_bad: HashSet<TaskId> = HashSet::new();
        let mut running = 0usize;
        let mut cancelled = false;

        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<TaskRun>();

        loop {
            self.propagate_skips(&topo, &mut runs, &started, &mut settled_bad, &mut order);

            if cancelled {
                self.skip_unstarted(&topo, &mut runs, &started, &mut settled_bad, &mut order);
            } else {
                // Admit ready tasks in priority-topological order while
                // worker capacity remains.
                for id in &topo {
                    if running >= self.options.workers || cancelled {
                        break;
                    }
                    if started.contains(id) || runs[id].is_terminal() {
                        continue;
                    }
                    let deps = self.graph.dependencies_of(id);
                    if !deps.iter().all(|d| succeeded.contains(d)) {
                        continue;
                    }
                    self.spawn_task(id, &done_tx);
                    started.insert(id.clone());
                    order.push(id.clone());
                    running += 1;
                }
            }

            if runs.values().all(|r| r.is_terminal()) {
                break;
            }

            tokio::select! {
                Some(run) = done_rx.recv() => {
                    running -= 1;
                    flog_debug!(
                        "batch {}: task {} finished with {}",
                        self.batch_id,
                        run.task_id,
                        run.status
                    );
                    if run.status == TaskStatus::Succeeded {
                        succeeded.insert(run.task_id.clone());
                    } else {
                        settled_bad.insert(run.task_id.clone());
                    }
                    self.emit(SchedulerEvent::TaskFinished {
                        task_id: run.task_id.clone(),
                        status: run.status.clone(),
                    });
                    runs.insert(run.task_id.clone(), run);
                }
                _ = self.cancel.cancelled(), if !cancelled => {
                    flog!("batch {} cancelled", self.batch_id);
                    cancelled = true;
                }
            }
        }

        self.emit(SchedulerEvent::BatchComplete);
        let result = BatchResult {
            batch_id: self.batch_id,
            runs,
            order,
        };
        flog!(
            "batch {} complete: {} succeeded, {} failed, {} skipped",
            self.batch_id,
            result.succeeded_count(),
            result.failed_count(),
            result.skipped_count()
        );
        result
    }

    /// Skip every unstarted task with a failed or skipped dependency.
    ///
    /// A single pass in topological order reaches the fixpoint, so
    /// skips chain through transitive dependents deterministically.
    fn propagate_skips(
        &self,
        topo: &[TaskId],
        runs: &mut HashMap<TaskId, TaskRun>,
        started: &HashSet<TaskId>,
        settled_bad: &mut HashSet<TaskId>,
        order: &mut Vec<TaskId>,
    ) {
        for id in topo {
            if started.contains(id) || runs[id].is_terminal() {
                continue;
            }
            let spec = match self.graph.get(id) {
                Some(spec) => spec,
                None => continue,
            };
            // First blocked dependency in declared order names the cause.
            let blocked = spec
                .dependencies
                .iter()
                .find(|d| settled_bad.contains(*d));
            if let Some(dependency) = blocked {
                let cause = SkipCause::DependencyFailed {
                    dependency: dependency.clone(),
                };
                if let Some(run) = runs.get_mut(id) {
                    run.skip(cause.clone());
                }
                settled_bad.insert(id.clone());
                order.push(id.clone());
                flog_debug!("batch {}: task {} skipped ({})", self.batch_id, id, cause);
                self.emit(SchedulerEvent::TaskSkipped {
                    task_id: id.clone(),
                    cause,
                });
            }
        }
    }

    /// After cancellation, everything not yet started is skipped.
    fn skip_unstarted(
        &self,
        topo: &[TaskId],
        runs: &mut HashMap<TaskId, TaskRun>,
        started: &HashSet<TaskId>,
        settled_bad: &mut HashSet<TaskId>,
        order: &mut Vec<TaskId>,
    ) {
        for id in topo {
            if started.contains(id) || runs[id].is_terminal() {
                continue;
            }
            if let Some(run) = runs.get_mut(id) {
                run.skip(SkipCause::BatchCancelled);
            }
            settled_bad.insert(id.clone());
            order.push(id.clone());
            self.emit(SchedulerEvent::TaskSkipped {
                task_id: id.clone(),
                cause: SkipCause::BatchCancelled,
            });
        }
    }

    fn spawn_task(&self, id: &TaskId, done_tx: &mpsc::UnboundedSender<TaskRun>) {
        // Ids come from the precomputed order, so the spec exists.
        let spec = match self.graph.get(id) {
            Some(spec) => spec.clone(),
            None => return,
        };
        flog!("batch {}: task {} admitted", self.batch_id, id);
        self.emit(SchedulerEvent::TaskStarted {
            task_id: id.clone(),
        });
        let machine = TaskMachine::new(
            spec,
            self.backend.clone(),
            self.executor.clone(),
            self.recorder.clone(),
            RunOptions {
                max_iterations: self.options.max_iterations,
                timeout: self.options.timeout,
            },
        );
        let done_tx = done_tx.clone();
        tokio::spawn(async move {
            let run = machine.run().await;
            let _ = done_tx.send(run);
        });
    }
}
