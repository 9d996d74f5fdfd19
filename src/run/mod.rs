//! Per-task execution: the phase model and the state machine that
//! drives one task from understanding to a terminal state.

pub mod machine;
pub mod phase;

pub use machine::{RunOptions, TaskMachine};
pub use phase::{Phase, PhaseHistoryEntry, PhaseState};
