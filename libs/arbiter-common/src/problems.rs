use crate::types::ProblemSpec;
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Lookup capability for problems.
///
/// Injected into the judge so it never reaches for global state. A store
/// must return test cases in their authored order.
pub trait ProblemStore: Send + Sync {
    fn get(&self, id: &str) -> Option<Arc<ProblemSpec>>;

    /// All problems, sorted by id.
    fn list(&self) -> Vec<Arc<ProblemSpec>>;
}

/// Sidebar-style index entry.
#[derive(Debug, Clone, Serialize)]
pub struct ProblemSummary {
    pub id: String,
    pub title: Option<String>,
    pub test_cases: usize,
}

impl From<&ProblemSpec> for ProblemSummary {
    fn from(problem: &ProblemSpec) -> Self {
        Self {
            id: problem.id.clone(),
            title: problem.title.clone(),
            test_cases: problem.test_cases.len(),
        }
    }
}

/// Read-only in-memory store, loaded once.
#[derive(Debug, Default, Clone)]
pub struct InMemoryProblemStore {
    problems: HashMap<String, Arc<ProblemSpec>>,
}

impl InMemoryProblemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from already-parsed problems. Duplicate ids are rejected.
    pub fn from_problems(problems: impl IntoIterator<Item = ProblemSpec>) -> Result<Self> {
        let mut store = Self::new();
        for problem in problems {
            store.insert(problem)?;
        }
        Ok(store)
    }

    pub fn insert(&mut self, problem: ProblemSpec) -> Result<()> {
        if self.problems.contains_key(&problem.id) {
            bail!("Duplicate problem id: {}", problem.id);
        }
        self.problems.insert(problem.id.clone(), Arc::new(problem));
        Ok(())
    }

    /// Load every `*.json` problem under `dir`, both at the top level and one
    /// directory down (`problems/day_1/two_sum.json`).
    pub fn load_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            bail!("Problems directory not found: {}", dir.display());
        }

        let mut store = Self::new();
        for path in problem_files(dir)? {
            let problem = load_problem_file(&path)?;
            debug!(problem_id = %problem.id, path = %path.display(), "Loaded problem");
            store
                .insert(problem)
                .with_context(|| format!("Failed to register {}", path.display()))?;
        }

        info!(count = store.len(), dir = %dir.display(), "Problem store loaded");
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }
}

impl ProblemStore for InMemoryProblemStore {
    fn get(&self, id: &str) -> Option<Arc<ProblemSpec>> {
        self.problems.get(id).cloned()
    }

    fn list(&self) -> Vec<Arc<ProblemSpec>> {
        let mut all: Vec<_> = self.problems.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}

/// Parse a single problem file.
pub fn load_problem_file(path: &Path) -> Result<ProblemSpec> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// `*.json` files directly in `dir` and one level below, in a deterministic order.
pub fn problem_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in sorted_entries(dir)? {
        if entry.is_dir() {
            files.extend(
                sorted_entries(&entry)?
                    .into_iter()
                    .filter(|p| p.is_file() && is_json(p)),
            );
        } else if is_json(&entry) {
            files.push(entry);
        }
    }

    Ok(files)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("Failed to list {}", dir.display()))?;
    entries.sort();
    Ok(entries)
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}
