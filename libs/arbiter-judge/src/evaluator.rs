//! Result Comparator - turns one raw run into one case result.
//!
//! **Critical properties:**
//! - Knows nothing about processes, interpreters or problem storage
//! - Pure function: (run outcome, test case) -> ExecutionResult
//!
//! **Classification order:**
//! 1. Infrastructure failure -> error (internal)
//! 2. Wall-clock timeout or CPU limit -> error (timeout)
//! 3. Any stderr output -> error (runtime), even when the answer is right
//! 4. Silent crash (non-zero exit or signal) -> error (runtime)
//! 5. Output comparison -> passed / failed
//!
//! **Comparison rules:**
//! - stdout is trimmed of leading/trailing whitespace
//! - the expected literal is used verbatim
//! - case-sensitive, no numeric or container-order tolerance

use crate::engine::{ProcessOutput, RunOutcome};
use arbiter_common::types::{CaseStatus, ErrorKind, ExecutionResult, TestCase};
use std::time::Duration;

/// Textual comparison of captured stdout against the expected literal.
pub fn outputs_match(stdout: &str, expected: &str) -> bool {
    stdout.trim() == expected
}

/// Render a limit the way verdict messages show it: `2s`, `1500ms`.
pub fn format_limit(limit: Duration) -> String {
    let millis = limit.as_millis();
    if millis > 0 && millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{}ms", millis)
    }
}

pub fn time_limit_message(timeout: Duration) -> String {
    format!("Time Limit Exceeded ({})", format_limit(timeout))
}

pub fn internal_error_message(cause: &str) -> String {
    format!("Internal Execution Error: {}", cause)
}

/// Evaluate a single case.
///
/// `index` is the 1-based position of `test_case` in its problem.
pub fn evaluate_case(
    index: usize,
    outcome: &RunOutcome,
    test_case: &TestCase,
    timeout: Duration,
) -> ExecutionResult {
    let status = match outcome {
        RunOutcome::Internal(cause) => error(ErrorKind::InternalError, internal_error_message(cause)),
        RunOutcome::TimedOut { .. } => error(ErrorKind::Timeout, time_limit_message(timeout)),
        RunOutcome::Completed(output) => classify_completed(output, test_case),
    };

    ExecutionResult { index, status }
}

fn classify_completed(output: &ProcessOutput, test_case: &TestCase) -> CaseStatus {
    if output.signal == Some(libc::SIGXCPU) {
        return error(ErrorKind::Timeout, "CPU Time Limit Exceeded".to_string());
    }

    // Strict policy: stderr is never just a warning.
    if !output.stderr.is_empty() {
        let message = output.stderr.trim();
        let message = if message.is_empty() {
            "Program wrote to stderr".to_string()
        } else {
            message.to_string()
        };
        return error(ErrorKind::RuntimeError, message);
    }

    if let Some(signal) = output.signal {
        return error(
            ErrorKind::RuntimeError,
            format!(
                "Process terminated by signal {} ({})",
                signal,
                crate::sandbox::signal_name(signal)
            ),
        );
    }

    if let Some(code) = output.exit_code.filter(|code| *code != 0) {
        return error(
            ErrorKind::RuntimeError,
            format!("Process exited with status {}", code),
        );
    }

    let got = output.stdout.trim();
    if outputs_match(got, &test_case.output) {
        CaseStatus::Passed
    } else {
        CaseStatus::Failed {
            input: test_case.input.clone(),
            expected: test_case.output.clone(),
            got: got.to_string(),
        }
    }
}

fn error(kind: ErrorKind, message: String) -> CaseStatus {
    CaseStatus::Error { kind, message }
}
