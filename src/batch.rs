//! Batch file parsing.
//!
//! A batch is a JSON array of task objects:
//!
//! ```json
//! [
//!   {"task_id": "add", "description": "...", "test_call": "add(2, 3)",
//!    "priority": "high", "dependencies": []}
//! ]
//! ```
//!
//! Structural problems (duplicate ids, unknown dependencies, cycles)
//! are caught by graph validation in the scheduler; this module only
//! parses and rejects shapes the graph cannot see.

use std::path::Path;

use crate::core::TaskSpec;
use crate::{flog_debug, Error, Result};

/// Parse a batch from JSON text.
pub fn parse_batch(json: &str) -> Result<Vec<TaskSpec>> {
    let specs: Vec<TaskSpec> = serde_json::from_str(json)?;
    if specs.is_empty() {
        return Err(Error::Validation("batch contains no tasks".to_string()));
    }
    for spec in &specs {
        if spec.id.as_str().trim().is_empty() {
            return Err(Error::Validation("task with empty id".to_string()));
        }
        if spec.description.trim().is_empty() {
            return Err(Error::Validation(format!(
                "task {} has an empty description",
                spec.id
            )));
        }
    }
    Ok(specs)
}

/// Load and parse a batch file.
pub fn load_batch(path: &Path) -> Result<Vec<TaskSpec>> {
    flog_debug!("load_batch: {}", path.display());
    let contents = std::fs::read_to_string(path)?;
    parse_batch(&contents)
}
