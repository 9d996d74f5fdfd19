//! Core data model: task specifications, runs, and the dependency graph.

pub mod graph;
pub mod task;

pub use graph::TaskGraph;
pub use task::{
    FailureKind, IterationRecord, SkipCause, TaskId, TaskPriority, TaskRun, TaskSpec, TaskStatus,
};
