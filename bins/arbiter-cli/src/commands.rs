// CLI commands for judging and checking problem sets
use anyhow::{bail, Context, Result};
use arbiter_common::problems::{load_problem_file, problem_files, InMemoryProblemStore, ProblemStore};
use arbiter_common::types::{CaseStatus, EvaluationResponse, Submission, Verdict};
use arbiter_judge::{EngineConfig, Judge, ProcessEngine};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Judge `source` against `problem_id`. Returns whether it passed.
pub async fn run_submission(
    problem_id: &str,
    source: &Path,
    problems_dir: &Path,
    config: &Path,
    timeout_ms: Option<u64>,
    json: bool,
) -> Result<bool> {
    let code = fs::read_to_string(source)
        .with_context(|| format!("Failed to read {}", source.display()))?;

    let mut engine_config = EngineConfig::load_or_default(config)?;
    if let Some(timeout_ms) = timeout_ms {
        engine_config.timeout_ms = timeout_ms;
        engine_config.validate()?;
    }
    debug!(
        interpreter = %engine_config.interpreter.command,
        timeout_ms = engine_config.timeout_ms,
        "Engine configured"
    );

    let store = InMemoryProblemStore::load_dir(problems_dir)?;
    debug!(problems = store.len(), dir = %problems_dir.display(), "Problems loaded");

    let judge = Judge::new(ProcessEngine::new(engine_config), store);
    let verdict = judge.evaluate(&Submission::new(code, problem_id)).await;
    info!(
        problem_id,
        passed = verdict.passed,
        cases = verdict.results.len(),
        elapsed_ms = verdict.elapsed_ms,
        "Submission judged"
    );

    if json {
        let body = serde_json::to_string_pretty(&EvaluationResponse::from(&verdict))
            .context("Failed to serialize evaluation response")?;
        println!("{}", body);
    } else {
        print_report(&verdict);
    }

    Ok(verdict.passed)
}

fn print_report(verdict: &Verdict) {
    println!("🧪 Judging '{}'", verdict.problem_id);

    for result in &verdict.results {
        match &result.status {
            CaseStatus::Passed => println!("  ✅ Case {}: passed", result.index),
            CaseStatus::Failed { input, expected, got } => {
                println!("  ❌ Case {}: wrong answer", result.index);
                println!("     input:    {}", input);
                println!("     expected: {}", expected);
                println!("     got:      {}", got);
            }
            CaseStatus::Error { kind, message } => {
                println!("  💥 Case {}: {}", result.index, kind);
                for line in message.lines() {
                    println!("     {}", line);
                }
            }
        }
    }

    println!();
    if verdict.passed {
        println!(
            "✅ Passed all {} test cases in {}ms",
            verdict.total_cases, verdict.elapsed_ms
        );
    } else {
        println!(
            "❌ Failed ({}/{} passed) in {}ms",
            verdict.passed_count(),
            verdict.total_cases,
            verdict.elapsed_ms
        );
    }
}

/// Print the problem index.
pub fn list_problems(problems_dir: &Path) -> Result<()> {
    let store = InMemoryProblemStore::load_dir(problems_dir)?;

    if store.is_empty() {
        println!("No problems found in {}", problems_dir.display());
        return Ok(());
    }

    println!("📚 {} problem(s) in {}", store.len(), problems_dir.display());
    for problem in store.list() {
        let title = problem.title.as_deref().unwrap_or("-");
        let difficulty = problem.difficulty.as_deref().unwrap_or("-");
        println!(
            "  {:<24} {:<32} {:<8} {} case(s)",
            problem.id,
            title,
            difficulty,
            problem.test_cases.len()
        );
    }

    Ok(())
}

/// Something wrong with a problem file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    Unreadable { path: PathBuf, error: String },
    NoTestCases { path: PathBuf, id: String },
    DuplicateId { id: String, paths: Vec<PathBuf> },
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Finding::Unreadable { path, error } => {
                write!(f, "{}: {}", path.display(), error)
            }
            Finding::NoTestCases { path, id } => {
                write!(f, "{}: problem '{}' has no test cases", path.display(), id)
            }
            Finding::DuplicateId { id, paths } => {
                let paths: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
                write!(f, "duplicate id '{}' in {}", id, paths.join(", "))
            }
        }
    }
}

/// Inspect every problem file without stopping at the first bad one.
pub fn find_problems(problems_dir: &Path) -> Result<Vec<Finding>> {
    if !problems_dir.is_dir() {
        bail!("Problems directory not found: {}", problems_dir.display());
    }

    let mut findings = Vec::new();
    let mut owners: HashMap<String, Vec<PathBuf>> = HashMap::new();
    let mut order = Vec::new();

    for path in problem_files(problems_dir)? {
        debug!(path = %path.display(), "Checking problem file");
        let problem = match load_problem_file(&path) {
            Ok(problem) => problem,
            Err(e) => {
                findings.push(Finding::Unreadable {
                    path,
                    error: format!("{:#}", e),
                });
                continue;
            }
        };

        if problem.test_cases.is_empty() {
            findings.push(Finding::NoTestCases {
                path: path.clone(),
                id: problem.id.clone(),
            });
        }

        let paths = owners.entry(problem.id.clone()).or_default();
        if paths.is_empty() {
            order.push(problem.id);
        }
        paths.push(path);
    }

    for id in order {
        if let Some(paths) = owners.remove(&id) {
            if paths.len() > 1 {
                findings.push(Finding::DuplicateId { id, paths });
            }
        }
    }

    Ok(findings)
}

/// Report findings. Returns true when the directory is clean.
pub fn validate_problems(problems_dir: &Path) -> Result<bool> {
    let findings = find_problems(problems_dir)?;

    if findings.is_empty() {
        println!("✅ All problems in {} are valid", problems_dir.display());
        return Ok(true);
    }

    println!("⚠️  {} issue(s) in {}:", findings.len(), problems_dir.display());
    for finding in &findings {
        println!("  - {}", finding);
    }
    Ok(false)
}
