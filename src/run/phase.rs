//! Phases of a single task run and the legal transitions between them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Phase of a task run.
///
/// Generation phases run once; the executing/diagnosing/repairing loop
/// repeats up to the iteration budget. Succeeded and Failed are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Understanding,
    Designing,
    Programming,
    Executing,
    Diagnosing,
    Repairing,
    Succeeded,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed)
    }

    /// Whether moving from `self` to `target` is a legal transition.
    pub fn can_transition(&self, target: Phase) -> bool {
        matches!(
            (self, target),
            // The straight-line generation pipeline.
            (Phase::Understanding, Phase::Designing)
                | (Phase::Designing, Phase::Programming)
                | (Phase::Programming, Phase::Executing)
                // The repair loop.
                | (Phase::Executing, Phase::Succeeded)
                | (Phase::Executing, Phase::Diagnosing)
                | (Phase::Diagnosing, Phase::Repairing)
                | (Phase::Repairing, Phase::Executing)
                // Backend failures end generation phases immediately;
                // the diagnosing and repairing phases also end the run
                // when the budget is spent or repair itself fails.
                | (Phase::Understanding, Phase::Failed)
                | (Phase::Designing, Phase::Failed)
                | (Phase::Programming, Phase::Failed)
                | (Phase::Diagnosing, Phase::Failed)
                | (Phase::Repairing, Phase::Failed)
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Understanding => "understanding",
            Phase::Designing => "designing",
            Phase::Programming => "programming",
            Phase::Executing => "executing",
            Phase::Diagnosing => "diagnosing",
            Phase::Repairing => "repairing",
            Phase::Succeeded => "succeeded",
            Phase::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// One entry in a run's phase history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseHistoryEntry {
    pub from: Phase,
    pub to: Phase,
    pub at: DateTime<Utc>,
}

/// Tracks the current phase of a run and every transition it took.
#[derive(Debug, Clone)]
pub struct PhaseState {
    current: Phase,
    history: Vec<PhaseHistoryEntry>,
}

impl Default for PhaseState {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseState {
    pub fn new() -> Self {
        Self {
            current: Phase::Understanding,
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> Phase {
        self.current
    }

    pub fn history(&self) -> &[PhaseHistoryEntry] {
        &self.history
    }

    /// Transition to `target`, rejecting illegal moves.
    pub fn transition(&mut self, target: Phase) -> Result<()> {
        if !self.current.can_transition(target) {
            return Err(Error::InvalidPhaseTransition {
                from: self.current.to_string(),
                to: target.to_string(),
            });
        }
        self.history.push(PhaseHistoryEntry {
            from: self.current,
            to: target,
            at: Utc::now(),
        });
        self.current = target;
        Ok(())
    }
}
