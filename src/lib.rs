//! forge: closed-loop code generation with dependency-aware batch
//! scheduling.
//!
//! A task is a natural-language description plus an optional test
//! call. forge drives each task through understand, design, generate,
//! execute, diagnose, and repair phases until the code runs clean or
//! the repair budget is spent. Batches of tasks run concurrently under
//! a worker limit, respecting dependencies and priorities; a failed
//! task skips its dependents.

pub mod batch;
pub mod config;
pub mod core;
pub mod error;
pub mod history;
pub mod log;
pub mod phases;
pub mod run;
pub mod sandbox;
pub mod sched;

pub use error::{Error, Result};
