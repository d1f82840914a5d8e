//! Arbiter judging engine.
//!
//! `Judge` runs a submission against a problem's test cases one at a time,
//! each in a fresh interpreter process, and stops at the first case that
//! does not pass.

pub mod config;
pub mod engine;
pub mod evaluator;
pub mod executor;
pub mod harness;
pub mod sandbox;

#[cfg(test)]
mod engine_tests;

pub use config::EngineConfig;
pub use engine::{ExecutionEngine, ProcessEngine, ProcessOutput, RunOutcome};
pub use executor::{Completion, Judge, RunState};
pub use sandbox::Isolation;
