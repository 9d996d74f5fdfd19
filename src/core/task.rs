//! Task data model for the batch execution graph.
//!
//! A `TaskSpec` is the immutable input record for one programming task.
//! A `TaskRun` is the mutable execution record the state machine produces
//! for it, including the full sequence of iteration records.

use crate::run::Phase;
use crate::sandbox::ExecutionReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a task within a batch.
///
/// Task ids are caller-supplied strings (e.g. "add", "sort"), unique
/// within one batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Scheduling priority for a task.
///
/// Among ready tasks, HIGH runs before NORMAL, NORMAL before LOW.
/// Ties are broken by original input order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskPriority::Low => write!(f, "low"),
            TaskPriority::Normal => write!(f, "normal"),
            TaskPriority::High => write!(f, "high"),
        }
    }
}

/// Immutable input record for one programming task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Unique identifier within the batch.
    #[serde(rename = "task_id")]
    pub id: TaskId,
    /// Natural-language description of what the code should do.
    pub description: String,
    /// Optional expression evaluated against the executed namespace to
    /// validate success (e.g. "add(2, 3)").
    #[serde(default)]
    pub test_call: Option<String>,
    /// Scheduling priority (default normal).
    #[serde(default)]
    pub priority: TaskPriority,
    /// Ids of tasks that must succeed before this one may run.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
}

impl TaskSpec {
    /// Create a spec with no test call, normal priority, and no dependencies.
    pub fn new(id: impl Into<TaskId>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            test_call: None,
            priority: TaskPriority::Normal,
            dependencies: Vec::new(),
        }
    }

    pub fn with_test_call(mut self, test_call: impl Into<String>) -> Self {
        self.test_call = Some(test_call.into());
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<TaskId>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Why a task run ended in FAILED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FailureKind {
    /// A phase collaborator's generation backend failed. Fatal, no retry.
    Backend {
        /// Error message from the backend.
        message: String,
    },
    /// The repair budget was exhausted without a successful execution.
    IterationLimitExceeded {
        /// Total execution attempts made (repair budget + 1).
        attempts: u32,
    },
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Backend { message } => write!(f, "backend error: {}", message),
            FailureKind::IterationLimitExceeded { attempts } => {
                write!(f, "iteration limit exceeded after {} attempts", attempts)
            }
        }
    }
}

/// Why a task run ended in SKIPPED without ever running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SkipCause {
    /// An upstream dependency failed or was itself skipped.
    DependencyFailed {
        /// The dependency whose terminal state blocked this task.
        dependency: TaskId,
    },
    /// The batch was cancelled before this task was admitted.
    BatchCancelled,
}

impl std::fmt::Display for SkipCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipCause::DependencyFailed { dependency } => {
                write!(f, "dependency failed: {}", dependency)
            }
            SkipCause::BatchCancelled => write!(f, "batch cancelled"),
        }
    }
}

/// Lifecycle status of a task run.
///
/// Runs progress Pending -> Running -> exactly one terminal state;
/// terminal runs are never reopened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskStatus {
    /// Admitted by the scheduler but not yet started.
    Pending,
    /// The state machine is driving the task through its phases.
    Running,
    /// Execution (and the test call, if any) completed without raising.
    Succeeded,
    /// The task failed terminally.
    Failed {
        /// The failure cause.
        cause: FailureKind,
    },
    /// The task was never run.
    Skipped {
        /// Why the task was skipped.
        cause: SkipCause,
    },
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    /// Check if this is a terminal status (Succeeded, Failed, or Skipped).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed { .. } | TaskStatus::Skipped { .. }
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Failed { cause } => write!(f, "failed: {}", cause),
            TaskStatus::Skipped { cause } => write!(f, "skipped: {}", cause),
        }
    }
}

/// One execution attempt within a task run.
///
/// Created once per entry into the executing phase; immutable once
/// appended. Retains the full executor report and diagnosis for
/// post-hoc inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 0-based attempt index (0 is the first, unrepaired attempt).
    pub iteration: u32,
    /// The code artifact that was executed.
    pub code: String,
    /// The sandbox's raw result.
    pub result: ExecutionReport,
    /// Diagnosis of the failure, absent on success or when the
    /// diagnosis collaborator was unavailable.
    pub diagnosis: Option<String>,
    /// When the attempt was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl IterationRecord {
    pub fn new(
        iteration: u32,
        code: String,
        result: ExecutionReport,
        diagnosis: Option<String>,
    ) -> Self {
        Self {
            iteration,
            code,
            result,
            diagnosis,
            recorded_at: Utc::now(),
        }
    }
}

/// The mutable execution record of one TaskSpec through the state machine.
///
/// Owned exclusively by the machine while active, then frozen and handed
/// back to the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRun {
    /// The task this run belongs to.
    pub task_id: TaskId,
    /// The phase the run is currently in (or ended in).
    pub phase: Phase,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Execution attempts, strictly ordered by executing-phase entry.
    iterations: Vec<IterationRecord>,
    /// The final code artifact when the run succeeded.
    pub final_code: Option<String>,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
    /// When the state machine started driving the run.
    pub started_at: Option<DateTime<Utc>>,
    /// When the run reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRun {
    /// Create a new pending run for a task.
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            phase: Phase::Understanding,
            status: TaskStatus::Pending,
            iterations: Vec::new(),
            final_code: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Transition to Running and record the start time.
    pub fn start(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Freeze the run as Succeeded with its final code artifact.
    pub fn succeed(&mut self, final_code: String) {
        self.status = TaskStatus::Succeeded;
        self.final_code = Some(final_code);
        self.finished_at = Some(Utc::now());
    }

    /// Freeze the run as Failed with the given cause.
    pub fn fail(&mut self, cause: FailureKind) {
        self.status = TaskStatus::Failed { cause };
        self.finished_at = Some(Utc::now());
    }

    /// Freeze the run as Skipped without ever running it.
    pub fn skip(&mut self, cause: SkipCause) {
        self.status = TaskStatus::Skipped { cause };
        self.finished_at = Some(Utc::now());
    }

    /// Append one execution attempt. Records are append-only.
    pub fn push_iteration(&mut self, record: IterationRecord) {
        self.iterations.push(record);
    }

    /// All execution attempts, in the order executing was entered.
    pub fn iterations(&self) -> &[IterationRecord] {
        &self.iterations
    }

    /// Number of execution attempts made.
    pub fn attempt_count(&self) -> usize {
        self.iterations.len()
    }

    /// Check if the run has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
