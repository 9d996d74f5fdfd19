//! Repair phase: produce a corrected code artifact from a failed attempt.

use crate::core::IterationRecord;
use crate::phases::backend::{Backend, GenerateRequest, RequestKind};
use crate::phases::programming::{extract_code, CodeArtifact};
use crate::sandbox::ExecutionReport;
use crate::{flog_debug, Result};

const SYSTEM: &str = "You are an expert at fixing code issues.\n\
Generate corrected Python code that fixes the identified issues.\n\
Maintain the same functionality while fixing the errors.\n\
Only output the corrected Python code, nothing else.";

/// Ask the backend for a repaired version of failing code.
///
/// Prior attempts are summarized in the prompt so the backend does not
/// reintroduce an error it already produced.
pub async fn repair(
    backend: &dyn Backend,
    code: &str,
    diagnosis: Option<&str>,
    report: &ExecutionReport,
    history: &[IterationRecord],
) -> Result<CodeArtifact> {
    flog_debug!("repair: attempt {} in history", history.len());
    let error = report
        .exception
        .as_deref()
        .unwrap_or(if report.timed_out { "execution timed out" } else { "unknown failure" });

    let mut prompt = format!(
        "Fix this code based on the diagnosis:\n\n\
         ORIGINAL CODE:\n```python\n{}\n```\n\n\
         ERROR:\n{}\n",
        code, error
    );
    if let Some(diagnosis) = diagnosis {
        prompt.push_str(&format!("\nDIAGNOSIS:\n{}\n", diagnosis));
    }
    if history.len() > 1 {
        prompt.push_str("\nPREVIOUS ATTEMPTS (do not repeat these failures):\n");
        for record in &history[..history.len() - 1] {
            let failure = record
                .result
                .exception
                .as_deref()
                .unwrap_or(if record.result.timed_out {
                    "execution timed out"
                } else {
                    "unknown failure"
                });
            prompt.push_str(&format!("- attempt {}: {}\n", record.iteration, failure));
        }
    }
    prompt.push_str(
        "\nGenerate the corrected Python code that fixes these issues \
         while maintaining the same functionality.",
    );

    let response = backend
        .generate(GenerateRequest::new(RequestKind::Repair, SYSTEM, prompt))
        .await?;
    Ok(CodeArtifact {
        code: extract_code(&response),
    })
}
