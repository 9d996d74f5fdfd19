//! Batch-level scheduling behavior: coverage, validation, ordering.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use forge::core::{TaskId, TaskPriority, TaskStatus};
use forge::history::MemoryRecorder;
use forge::sched::{BatchOptions, BatchScheduler, SchedulerEvent};
use forge::Error;

use crate::fixtures::{task, task_deps, ScriptedBackend, ScriptedExecutor};

fn options(workers: usize) -> BatchOptions {
    BatchOptions {
        workers,
        max_iterations: 2,
        timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn batch_result_covers_every_task_exactly_once() {
    let backend = Arc::new(ScriptedBackend::new(&["a", "b", "c"]));
    let executor = Arc::new(ScriptedExecutor::new());
    let recorder = Arc::new(MemoryRecorder::new());

    let scheduler = BatchScheduler::new(
        vec![task("a"), task_deps("b", &["a"]), task("c")],
        backend,
        executor,
        recorder,
        options(2),
    )
    .unwrap();
    let result = scheduler.run().await;

    assert_eq!(result.runs.len(), 3);
    assert_eq!(result.order.len(), 3);
    for id in ["a", "b", "c"] {
        let run = &result.runs[&TaskId::new(id)];
        assert!(run.is_terminal(), "task {} not terminal: {}", id, run.status);
    }
    assert!(result.all_succeeded());
    assert_eq!(result.succeeded_count(), 3);
    assert_eq!(result.failed_count(), 0);
    assert_eq!(result.skipped_count(), 0);
}

#[tokio::test]
async fn duplicate_task_id_rejects_batch_before_any_run() {
    let backend = Arc::new(ScriptedBackend::new(&["a"]));
    let executor = Arc::new(ScriptedExecutor::new());
    let recorder = Arc::new(MemoryRecorder::new());

    let result = BatchScheduler::new(
        vec![task("a"), task("a")],
        backend.clone(),
        executor,
        recorder,
        options(2),
    );

    assert!(matches!(result, Err(Error::Validation(_))));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn unknown_dependency_rejects_batch_before_any_run() {
    let backend = Arc::new(ScriptedBackend::new(&["a"]));
    let executor = Arc::new(ScriptedExecutor::new());
    let recorder = Arc::new(MemoryRecorder::new());

    let result = BatchScheduler::new(
        vec![task_deps("a", &["ghost"])],
        backend.clone(),
        executor,
        recorder,
        options(2),
    );

    match result {
        Err(Error::Validation(msg)) => assert!(msg.contains("ghost")),
        other => panic!("expected validation error, got {:?}", other.is_ok()),
    }
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn dependency_cycle_rejects_batch_before_any_run() {
    let backend = Arc::new(ScriptedBackend::new(&["a", "b"]));
    let executor = Arc::new(ScriptedExecutor::new());
    let recorder = Arc::new(MemoryRecorder::new());

    let result = BatchScheduler::new(
        vec![task_deps("a", &["b"]), task_deps("b", &["a"])],
        backend.clone(),
        executor,
        recorder,
        options(2),
    );

    assert!(matches!(result, Err(Error::Validation(_))));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn dependency_finishes_before_dependent_starts() {
    let backend = Arc::new(ScriptedBackend::new(&["a", "b"]));
    let executor = Arc::new(ScriptedExecutor::new());
    let recorder = Arc::new(MemoryRecorder::new());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let scheduler = BatchScheduler::new(
        vec![task_deps("b", &["a"]), task("a")],
        backend,
        executor,
        recorder,
        options(4),
    )
    .unwrap()
    .with_events(tx);
    let result = scheduler.run().await;
    assert!(result.all_succeeded());

    let mut a_finished_at = None;
    let mut b_started_at = None;
    let mut position = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            SchedulerEvent::TaskFinished { task_id, .. } if task_id == TaskId::new("a") => {
                a_finished_at = Some(position);
            }
            SchedulerEvent::TaskStarted { task_id } if task_id == TaskId::new("b") => {
                b_started_at = Some(position);
            }
            _ => {}
        }
        position += 1;
    }
    assert!(a_finished_at.unwrap() < b_started_at.unwrap());
}

#[tokio::test]
async fn priority_orders_independent_tasks_under_one_worker() {
    let backend = Arc::new(ScriptedBackend::new(&["low", "normal", "high"]));
    let executor = Arc::new(ScriptedExecutor::new());
    let recorder = Arc::new(MemoryRecorder::new());

    let scheduler = BatchScheduler::new(
        vec![
            task("low").with_priority(TaskPriority::Low),
            task("normal"),
            task("high").with_priority(TaskPriority::High),
        ],
        backend,
        executor,
        recorder,
        options(1),
    )
    .unwrap();
    let result = scheduler.run().await;

    assert_eq!(
        result.order,
        vec![
            TaskId::new("high"),
            TaskId::new("normal"),
            TaskId::new("low")
        ]
    );
}

#[tokio::test]
async fn single_worker_serializes_execution() {
    let backend = Arc::new(ScriptedBackend::new(&["a", "b"]));
    let executor = Arc::new(ScriptedExecutor::new());
    let recorder = Arc::new(MemoryRecorder::new());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let scheduler = BatchScheduler::new(
        vec![task("a"), task("b")],
        backend,
        executor,
        recorder,
        options(1),
    )
    .unwrap()
    .with_events(tx);
    scheduler.run().await;

    // With one worker the second start can only follow the first finish.
    let mut in_flight = 0usize;
    while let Ok(event) = rx.try_recv() {
        match event {
            SchedulerEvent::TaskStarted { .. } => {
                in_flight += 1;
                assert!(in_flight <= 1, "two tasks in flight under one worker");
            }
            SchedulerEvent::TaskFinished { .. } => in_flight -= 1,
            _ => {}
        }
    }
}

#[tokio::test]
async fn mixed_batch_counts_are_consistent() {
    use crate::fixtures::ExecOutcome;

    let backend = Arc::new(ScriptedBackend::new(&["good", "bad", "dependent"]));
    let executor = Arc::new(ScriptedExecutor::new().script(
        "bad",
        &[ExecOutcome::Fail, ExecOutcome::Fail, ExecOutcome::Fail],
    ));
    let recorder = Arc::new(MemoryRecorder::new());

    let scheduler = BatchScheduler::new(
        vec![task("good"), task("bad"), task_deps("dependent", &["bad"])],
        backend,
        executor,
        recorder,
        options(2),
    )
    .unwrap();
    let result = scheduler.run().await;

    assert_eq!(result.succeeded_count(), 1);
    assert_eq!(result.failed_count(), 1);
    assert_eq!(result.skipped_count(), 1);
    assert!(!result.all_succeeded());
    assert_eq!(result.runs[&TaskId::new("good")].status, TaskStatus::Succeeded);
}
