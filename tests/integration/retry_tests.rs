//! The bounded execute/diagnose/repair loop and its iteration records.

use std::sync::Arc;
use std::time::Duration;

use forge::core::{FailureKind, TaskId, TaskStatus};
use forge::history::MemoryRecorder;
use forge::sched::{BatchOptions, BatchScheduler};

use crate::fixtures::{task, ExecOutcome, ScriptedBackend, ScriptedExecutor};

fn options(max_iterations: u32) -> BatchOptions {
    BatchOptions {
        workers: 1,
        max_iterations,
        timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn first_attempt_success_records_exactly_one_iteration() {
    let backend = Arc::new(ScriptedBackend::new(&["t"]));
    let executor = Arc::new(ScriptedExecutor::new());
    let recorder = Arc::new(MemoryRecorder::new());

    let scheduler = BatchScheduler::new(
        vec![task("t")],
        backend,
        executor,
        recorder.clone(),
        options(3),
    )
    .unwrap();
    let result = scheduler.run().await;

    let run = &result.runs[&TaskId::new("t")];
    assert_eq!(run.status, TaskStatus::Succeeded);
    assert_eq!(run.attempt_count(), 1);
    assert!(run.iterations()[0].result.success);
    assert!(run.iterations()[0].diagnosis.is_none());
    assert!(run.final_code.is_some());
    assert_eq!(recorder.count_for(&TaskId::new("t")), 1);
}

#[tokio::test]
async fn exhausted_budget_records_budget_plus_one_attempts() {
    let backend = Arc::new(ScriptedBackend::new(&["t"]));
    let executor = Arc::new(ScriptedExecutor::new().script(
        "t",
        &[
            ExecOutcome::Fail,
            ExecOutcome::Fail,
            ExecOutcome::Fail,
            ExecOutcome::Fail,
        ],
    ));
    let recorder = Arc::new(MemoryRecorder::new());

    let scheduler = BatchScheduler::new(
        vec![task("t")],
        backend,
        executor,
        recorder.clone(),
        options(3),
    )
    .unwrap();
    let result = scheduler.run().await;

    let run = &result.runs[&TaskId::new("t")];
    assert!(matches!(
        run.status,
        TaskStatus::Failed {
            cause: FailureKind::IterationLimitExceeded { attempts: 4 }
        }
    ));
    assert_eq!(run.attempt_count(), 4);
    assert!(run.final_code.is_none());
    // Every failed attempt carries a diagnosis from the backend.
    for record in run.iterations() {
        assert!(record.diagnosis.is_some());
    }
    assert_eq!(recorder.count_for(&TaskId::new("t")), 4);
}

#[tokio::test]
async fn repair_loop_recovers_within_budget() {
    let backend = Arc::new(ScriptedBackend::new(&["t"]));
    let executor = Arc::new(ScriptedExecutor::new().script(
        "t",
        &[ExecOutcome::Fail, ExecOutcome::Fail, ExecOutcome::Pass],
    ));
    let recorder = Arc::new(MemoryRecorder::new());

    let scheduler = BatchScheduler::new(
        vec![task("t")],
        backend,
        executor,
        recorder.clone(),
        options(2),
    )
    .unwrap();
    let result = scheduler.run().await;

    let run = &result.runs[&TaskId::new("t")];
    assert_eq!(run.status, TaskStatus::Succeeded);
    assert_eq!(run.attempt_count(), 3);
    // The final artifact is a repaired one, not the original.
    assert!(run.final_code.as_deref().unwrap().contains("repaired"));
    // Iteration indices are strictly ordered from zero.
    let indices: Vec<u32> = run.iterations().iter().map(|r| r.iteration).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert_eq!(recorder.count_for(&TaskId::new("t")), 3);
}

#[tokio::test]
async fn timeout_is_recorded_distinctly_from_failure() {
    let backend = Arc::new(ScriptedBackend::new(&["t"]));
    let executor = Arc::new(ScriptedExecutor::new().script(
        "t",
        &[ExecOutcome::Timeout, ExecOutcome::Fail, ExecOutcome::Pass],
    ));
    let recorder = Arc::new(MemoryRecorder::new());

    let scheduler = BatchScheduler::new(
        vec![task("t")],
        backend,
        executor,
        recorder,
        options(2),
    )
    .unwrap();
    let result = scheduler.run().await;

    let run = &result.runs[&TaskId::new("t")];
    assert_eq!(run.status, TaskStatus::Succeeded);
    assert_eq!(run.attempt_count(), 3);

    let timed_out = &run.iterations()[0].result;
    assert!(timed_out.timed_out);
    assert!(!timed_out.success);
    assert!(timed_out.exception.is_none());

    let failed = &run.iterations()[1].result;
    assert!(!failed.timed_out);
    assert!(failed.exception.is_some());
}

#[tokio::test]
async fn timeouts_count_against_the_budget() {
    let backend = Arc::new(ScriptedBackend::new(&["t"]));
    let executor = Arc::new(ScriptedExecutor::new().script(
        "t",
        &[ExecOutcome::Timeout, ExecOutcome::Timeout],
    ));
    let recorder = Arc::new(MemoryRecorder::new());

    let scheduler = BatchScheduler::new(
        vec![task("t")],
        backend,
        executor,
        recorder,
        options(1),
    )
    .unwrap();
    let result = scheduler.run().await;

    let run = &result.runs[&TaskId::new("t")];
    assert!(matches!(
        run.status,
        TaskStatus::Failed {
            cause: FailureKind::IterationLimitExceeded { attempts: 2 }
        }
    ));
    assert!(run.iterations().iter().all(|r| r.result.timed_out));
}
