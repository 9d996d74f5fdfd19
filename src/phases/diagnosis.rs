//! Diagnosis phase: explain why an execution attempt failed.

use crate::phases::backend::{Backend, GenerateRequest, RequestKind};
use crate::sandbox::ExecutionReport;
use crate::{flog_debug, Result};

const SYSTEM: &str = "You are an expert at diagnosing code issues.\n\
Analyze the error and provide:\n\
1. Root cause of the issue\n\
2. Specific problems in the code\n\
3. What needs to be fixed";

/// Ask the backend to diagnose a failed execution.
///
/// Only called for failed reports; the caller treats a diagnosis
/// failure as a missing diagnosis, not a task failure.
pub async fn diagnose(
    backend: &dyn Backend,
    code: &str,
    report: &ExecutionReport,
) -> Result<String> {
    flog_debug!(
        "diagnose: timed_out={} exception={:?}",
        report.timed_out,
        report.exception
    );
    let error = report
        .exception
        .as_deref()
        .unwrap_or(if report.timed_out { "execution timed out" } else { "" });
    let prompt = format!(
        "Analyze this code execution:\n\n\
         CODE:\n```python\n{}\n```\n\n\
         OUTPUT:\n{}\n\n\
         ERROR:\n{}\n{}\n\n\
         Provide diagnosis:\n\
         - Root Cause: What caused the error\n\
         - Issues: Specific problems in the code\n\
         - Fix Needed: What needs to be changed",
        code, report.stdout, error, report.stderr
    );
    backend
        .generate(GenerateRequest::new(RequestKind::Diagnose, SYSTEM, prompt))
        .await
}
