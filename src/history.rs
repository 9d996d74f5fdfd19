//! Iteration history recording.
//!
//! Recording is fire-and-forget: a broken recorder degrades history,
//! never a task. Recorders are injected, so batch runs can share one
//! sink and tests can capture entries in memory.

use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::core::{IterationRecord, TaskId};
use crate::flog_warn;

/// Sink for per-attempt iteration records.
pub trait HistoryRecorder: Send + Sync {
    /// Append one record. Must not fail the caller; implementations
    /// swallow and log their own errors.
    fn append(&self, task_id: &TaskId, record: &IterationRecord);
}

#[derive(Serialize)]
struct HistoryLine<'a> {
    task_id: &'a TaskId,
    #[serde(flatten)]
    record: &'a IterationRecord,
}

/// Recorder that appends one JSON object per line to a file.
pub struct JsonlRecorder {
    path: PathBuf,
    // Serializes appends so concurrent tasks never interleave lines.
    lock: Mutex<()>,
}

impl JsonlRecorder {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }
}

impl HistoryRecorder for JsonlRecorder {
    fn append(&self, task_id: &TaskId, record: &IterationRecord) {
        let line = match serde_json::to_string(&HistoryLine { task_id, record }) {
            Ok(line) => line,
            Err(e) => {
                flog_warn!("history: failed to serialize record for {}: {}", task_id, e);
                return;
            }
        };
        let guard = self.lock.lock();
        if guard.is_err() {
            flog_warn!("history: recorder lock poisoned, dropping record");
            return;
        }
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{}", line));
        if let Err(e) = result {
            flog_warn!("history: failed to append to {}: {}", self.path.display(), e);
        }
    }
}

/// Recorder that drops everything. Used when history is disabled.
pub struct NullRecorder;

impl HistoryRecorder for NullRecorder {
    fn append(&self, _task_id: &TaskId, _record: &IterationRecord) {}
}

/// In-memory recorder for tests.
#[derive(Default)]
pub struct MemoryRecorder {
    entries: Mutex<Vec<(TaskId, IterationRecord)>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(TaskId, IterationRecord)> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count_for(&self, task_id: &TaskId) -> usize {
        self.entries()
            .iter()
            .filter(|(id, _)| id == task_id)
            .count()
    }
}

impl HistoryRecorder for MemoryRecorder {
    fn append(&self, task_id: &TaskId, record: &IterationRecord) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((task_id.clone(), record.clone()));
        }
    }
}
