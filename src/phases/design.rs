//! Design phase: produce a solution blueprint from the task analysis.

use crate::phases::backend::{Backend, GenerateRequest, RequestKind};
use crate::phases::understanding::TaskAnalysis;
use crate::{flog_debug, Result};

/// Solution design derived from a task analysis.
#[derive(Debug, Clone)]
pub struct Blueprint {
    pub task_description: String,
    pub design: String,
}

const SYSTEM: &str = "You are an expert software architect.\n\
Design a clean, maintainable, and efficient solution.\n\
Include:\n\
1. Architecture overview\n\
2. Key functions/classes needed\n\
3. Data structures\n\
4. Algorithm approach\n\
5. Error handling strategy";

/// Ask the backend to design a solution for the analyzed task.
pub async fn design(backend: &dyn Backend, analysis: &TaskAnalysis) -> Result<Blueprint> {
    flog_debug!("design: {}", analysis.task_description);
    let prompt = format!(
        "Based on this task analysis:\n\n{}\n\n\
         Design a solution including:\n\
         - Architecture: Overall structure\n\
         - Components: Key functions/classes needed\n\
         - Data Structures: What data structures to use\n\
         - Algorithm: Step-by-step algorithm\n\
         - Error Handling: How to handle errors",
        analysis.analysis
    );
    let design = backend
        .generate(GenerateRequest::new(RequestKind::Design, SYSTEM, prompt))
        .await?;
    Ok(Blueprint {
        task_description: analysis.task_description.clone(),
        design,
    })
}
