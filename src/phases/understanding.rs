//! Understanding phase: turn a task description into a structured analysis.

use crate::phases::backend::{Backend, GenerateRequest, RequestKind};
use crate::{flog_debug, Result};

/// Structured analysis of a task description.
#[derive(Debug, Clone)]
pub struct TaskAnalysis {
    pub task_description: String,
    pub analysis: String,
}

const SYSTEM: &str = "You are an expert at understanding programming tasks.\n\
Analyze the task and extract:\n\
1. Main objective\n\
2. Input requirements\n\
3. Expected output\n\
4. Constraints\n\
5. Key steps needed\n\
\n\
Respond in a structured format.";

/// Ask the backend to analyze the task description.
pub async fn understand(backend: &dyn Backend, task_description: &str) -> Result<TaskAnalysis> {
    flog_debug!("understand: {}", task_description);
    let prompt = format!(
        "Analyze this programming task:\n\n{}\n\n\
         Provide a structured analysis with:\n\
         - Objective: What needs to be accomplished\n\
         - Inputs: What inputs are required\n\
         - Outputs: What should be produced\n\
         - Constraints: Any limitations or requirements\n\
         - Approach: High-level approach to solve it",
        task_description
    );
    let analysis = backend
        .generate(GenerateRequest::new(RequestKind::Understand, SYSTEM, prompt))
        .await?;
    Ok(TaskAnalysis {
        task_description: task_description.to_string(),
        analysis,
    })
}
