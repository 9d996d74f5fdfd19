//! Programming phase: generate a code artifact from a blueprint.

use crate::phases::backend::{Backend, GenerateRequest, RequestKind};
use crate::phases::design::Blueprint;
use crate::{flog_debug, Result};

/// A runnable code artifact produced by the backend.
#[derive(Debug, Clone)]
pub struct CodeArtifact {
    pub code: String,
}

const SYSTEM: &str = "You are an expert Python programmer.\n\
Generate clean, efficient, well-documented Python code.\n\
Include:\n\
1. Proper imports\n\
2. Clear function/class definitions\n\
3. Docstrings\n\
4. Error handling\n\
5. Type hints where appropriate\n\
\n\
Only output the Python code, nothing else.";

/// Ask the backend to generate code implementing the blueprint.
pub async fn generate_code(backend: &dyn Backend, blueprint: &Blueprint) -> Result<CodeArtifact> {
    flog_debug!("generate_code: {}", blueprint.task_description);
    let prompt = format!(
        "Based on this design:\n\n{}\n\n\
         Generate complete, runnable Python code that implements this design.\n\
         Make sure the code is production-quality with proper error handling.",
        blueprint.design
    );
    let response = backend
        .generate(GenerateRequest::new(RequestKind::Generate, SYSTEM, prompt))
        .await?;
    Ok(CodeArtifact {
        code: extract_code(&response),
    })
}

/// Strip markdown code fences from a backend response.
///
/// Backends often wrap code in ```python fences despite instructions.
/// When fenced blocks are present, only their contents survive; a
/// response without fences is assumed to be pure code.
pub fn extract_code(response: &str) -> String {
    let mut code_lines = Vec::new();
    let mut in_block = false;

    for line in response.trim().lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            in_block = !in_block;
            continue;
        }
        if in_block {
            code_lines.push(line);
        }
    }

    if code_lines.is_empty() {
        response.trim().to_string()
    } else {
        code_lines.join("\n").trim().to_string()
    }
}
