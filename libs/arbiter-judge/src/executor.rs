//! Verdict Aggregator - High-Level Orchestration
//!
//! Drives one submission through its problem's test cases:
//! 1. Assemble the program for case i (harness.rs)
//! 2. Run it (engine.rs)
//! 3. Classify the run (evaluator.rs)
//! 4. Continue on pass, stop on the first non-pass
//!
//! Cases run strictly one after another and in stored order. Nothing is
//! retried. Every failure mode ends up as a result entry, so `evaluate`
//! cannot fail.

use crate::engine::ExecutionEngine;
use crate::evaluator::{self, internal_error_message};
use crate::harness;
use arbiter_common::problems::ProblemStore;
use arbiter_common::types::{
    CaseStatus, ErrorKind, ExecutionResult, ProblemSpec, Submission, Verdict,
};
use chrono::Utc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Terminal outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    AllPassed,
    Rejected,
}

/// Progress of one evaluation. `Running(i)` means case `i` (1-based) is next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Running(usize),
    Completed(Completion),
}

impl RunState {
    /// First transition out of `Pending`.
    pub fn start(total_cases: usize) -> RunState {
        if total_cases == 0 {
            RunState::Completed(Completion::AllPassed)
        } else {
            RunState::Running(1)
        }
    }

    /// Transition after the current case produced `passed`.
    pub fn advance(self, passed: bool, total_cases: usize) -> RunState {
        match self {
            RunState::Pending => RunState::start(total_cases),
            RunState::Running(_) if !passed => RunState::Completed(Completion::Rejected),
            RunState::Running(i) if i >= total_cases => RunState::Completed(Completion::AllPassed),
            RunState::Running(i) => RunState::Running(i + 1),
            done @ RunState::Completed(_) => done,
        }
    }
}

/// The judging engine: an execution backend plus a problem lookup.
pub struct Judge<E, S> {
    engine: E,
    store: S,
}

impl<E, S> Judge<E, S>
where
    E: ExecutionEngine,
    S: ProblemStore,
{
    pub fn new(engine: E, store: S) -> Self {
        Self { engine, store }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resolve the submission's problem and judge it.
    ///
    /// An unknown problem id yields a rejected verdict with a single internal
    /// error at index 0, which is not attached to any test case.
    #[instrument(skip(self, submission), fields(problem_id = %submission.problem_id()))]
    pub async fn evaluate(&self, submission: &Submission) -> Verdict {
        match self.store.get(submission.problem_id()) {
            Some(problem) => self.judge(&problem, submission.source()).await,
            None => {
                warn!("Problem not found");
                let message = internal_error_message(&format!(
                    "problem '{}' not found",
                    submission.problem_id()
                ));
                Verdict::new(
                    Uuid::new_v4(),
                    submission.problem_id(),
                    0,
                    vec![ExecutionResult {
                        index: 0,
                        status: CaseStatus::Error {
                            kind: ErrorKind::InternalError,
                            message,
                        },
                    }],
                    Utc::now(),
                    0,
                )
            }
        }
    }

    /// Judge `source` against an already resolved problem.
    #[instrument(
        skip(self, problem, source),
        fields(
            problem_id = %problem.id,
            test_count = problem.test_cases.len(),
            source_size = source.len(),
        )
    )]
    pub async fn judge(&self, problem: &ProblemSpec, source: &str) -> Verdict {
        let evaluation_id = Uuid::new_v4();
        let judged_at = Utc::now();
        let start = Instant::now();
        let total = problem.test_cases.len();
        let timeout = self.engine.timeout();

        info!(evaluation_id = %evaluation_id, "Runner started");

        let mut results = Vec::with_capacity(total);
        let mut state = RunState::Pending.advance(true, total);

        while let RunState::Running(index) = state {
            let test_case = &problem.test_cases[index - 1];
            let program = harness::assemble(source, &problem.entry_point, &test_case.input);

            let outcome = self.engine.execute(&program).await;
            let result = evaluator::evaluate_case(index, &outcome, test_case, timeout);

            match &result.status {
                CaseStatus::Passed => debug!(case = index, "Case passed"),
                CaseStatus::Failed { expected, got, .. } => {
                    info!(case = index, expected = %expected, got = %got, "Case failed: output mismatch")
                }
                CaseStatus::Error { kind, message } => {
                    let preview: String = message.chars().take(100).collect();
                    warn!(case = index, kind = %kind, error = %preview, "Case errored")
                }
            }

            let passed = result.status.is_passed();
            results.push(result);
            state = state.advance(passed, total);
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let verdict = Verdict::new(
            evaluation_id,
            problem.id.clone(),
            total,
            results,
            judged_at,
            elapsed_ms,
        );

        if verdict.passed {
            info!(evaluation_id = %evaluation_id, elapsed_ms, "Result: PASSED ALL TESTS");
        } else {
            info!(
                evaluation_id = %evaluation_id,
                elapsed_ms,
                passed = verdict.passed_count(),
                total,
                "Result: FAILED"
            );
        }

        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_all_pass() {
        let mut state = RunState::Pending.advance(true, 2);
        assert_eq!(state, RunState::Running(1));
        state = state.advance(true, 2);
        assert_eq!(state, RunState::Running(2));
        state = state.advance(true, 2);
        assert_eq!(state, RunState::Completed(Completion::AllPassed));
    }

    #[test]
    fn test_state_machine_rejects_on_first_failure() {
        let state = RunState::Running(1).advance(false, 3);
        assert_eq!(state, RunState::Completed(Completion::Rejected));
    }

    #[test]
    fn test_state_machine_empty_problem() {
        assert_eq!(
            RunState::Pending.advance(true, 0),
            RunState::Completed(Completion::AllPassed)
        );
    }

    #[test]
    fn test_completed_is_terminal() {
        let done = RunState::Completed(Completion::Rejected);
        assert_eq!(done.advance(true, 5), done);
    }
}
