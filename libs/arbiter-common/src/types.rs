use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Name of the callable every submission is expected to define.
pub const DEFAULT_ENTRY_POINT: &str = "solve";

fn default_entry_point() -> String {
    DEFAULT_ENTRY_POINT.to_string()
}

/// A single test case. Both fields are source literals in the candidate
/// language: `input` is the argument list, `output` the canonical printed
/// form of the expected return value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub output: String,
}

/// A programming exercise as loaded from the problem store.
///
/// `test_cases` order is authoritative; the judge never reorders it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemSpec {
    pub id: String,
    #[serde(default = "default_entry_point")]
    pub entry_point: String,
    pub test_cases: Vec<TestCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl ProblemSpec {
    pub fn new(id: impl Into<String>, test_cases: Vec<TestCase>) -> Self {
        Self {
            id: id.into(),
            entry_point: default_entry_point(),
            test_cases,
            title: None,
            difficulty: None,
            tags: Vec::new(),
        }
    }
}

/// Candidate source submitted against a problem.
#[derive(Debug, Clone)]
pub struct Submission {
    source: String,
    problem_id: String,
}

impl Submission {
    pub fn new(source: impl Into<String>, problem_id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            problem_id: problem_id.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn problem_id(&self) -> &str {
        &self.problem_id
    }
}

/// Why a case ended in the `error` status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The candidate program wrote to stderr or died on its own.
    RuntimeError,
    /// Wall-clock or CPU budget exhausted.
    Timeout,
    /// The judge could not run the case (spawn/I/O failure, unknown problem).
    InternalError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::RuntimeError => "runtime_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InternalError => "internal_error",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of one test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CaseStatus {
    Passed,
    Failed {
        input: String,
        expected: String,
        got: String,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl CaseStatus {
    pub fn is_passed(&self) -> bool {
        matches!(self, CaseStatus::Passed)
    }

    /// Wire label used in evaluation responses and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            CaseStatus::Passed => "passed",
            CaseStatus::Failed { .. } => "failed",
            CaseStatus::Error { .. } => "error",
        }
    }
}

/// Result for one test case. `index` is 1-based and follows test case order;
/// 0 marks a failure that happened before any case ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub index: usize,
    #[serde(flatten)]
    pub status: CaseStatus,
}

/// Final outcome of judging one submission.
///
/// For a known problem, `results` is a prefix of its test cases and contains
/// at most one non-passed entry, which is then the last one. An unknown
/// problem yields `total_cases == 0` and a single internal error at index 0,
/// the only place that index appears.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub evaluation_id: Uuid,
    pub problem_id: String,
    pub passed: bool,
    pub total_cases: usize,
    pub results: Vec<ExecutionResult>,
    pub judged_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl Verdict {
    /// Build a verdict, deriving `passed` from the results.
    pub fn new(
        evaluation_id: Uuid,
        problem_id: impl Into<String>,
        total_cases: usize,
        results: Vec<ExecutionResult>,
        judged_at: DateTime<Utc>,
        elapsed_ms: u64,
    ) -> Self {
        let passed =
            results.len() == total_cases && results.iter().all(|r| r.status.is_passed());
        Self {
            evaluation_id,
            problem_id: problem_id.into(),
            passed,
            total_cases,
            results,
            judged_at,
            elapsed_ms,
        }
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.status.is_passed()).count()
    }

    /// The entry that stopped the run, if any.
    pub fn first_failure(&self) -> Option<&ExecutionResult> {
        self.results.iter().find(|r| !r.status.is_passed())
    }
}

/// Body of an evaluation request.
///
/// `code` is accepted as an alias of `submission_source`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRequest {
    #[serde(alias = "code")]
    pub submission_source: String,
    pub problem_id: String,
}

impl From<EvaluationRequest> for Submission {
    fn from(req: EvaluationRequest) -> Self {
        Submission::new(req.submission_source, req.problem_id)
    }
}

/// One entry of `details` in an evaluation response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseReport {
    pub index: usize,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub got: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ExecutionResult> for CaseReport {
    fn from(result: &ExecutionResult) -> Self {
        let mut report = CaseReport {
            index: result.index,
            status: result.status.label().to_string(),
            input: None,
            expected: None,
            got: None,
            error: None,
        };
        match &result.status {
            CaseStatus::Passed => {}
            CaseStatus::Failed { input, expected, got } => {
                report.input = Some(input.clone());
                report.expected = Some(expected.clone());
                report.got = Some(got.clone());
            }
            CaseStatus::Error { message, .. } => {
                report.error = Some(message.clone());
            }
        }
        report
    }
}

/// Body of an evaluation response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResponse {
    pub passed: bool,
    pub details: Vec<CaseReport>,
}

impl From<&Verdict> for EvaluationResponse {
    fn from(verdict: &Verdict) -> Self {
        Self {
            passed: verdict.passed,
            details: verdict.results.iter().map(CaseReport::from).collect(),
        }
    }
}
