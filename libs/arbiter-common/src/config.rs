// Service-level configuration shared by the API and CLI
use anyhow::{Context, Result};
use std::path::PathBuf;

pub const DEFAULT_PROBLEMS_DIR: &str = "problems";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_ENGINE_CONFIG: &str = "config/engine.json";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub problems_dir: PathBuf,
    pub bind_addr: String,
    pub engine_config: PathBuf,
    /// Upper bound on simultaneous evaluations. `None` means unbounded.
    pub max_concurrent_runs: Option<usize>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            problems_dir: PathBuf::from(DEFAULT_PROBLEMS_DIR),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            engine_config: PathBuf::from(DEFAULT_ENGINE_CONFIG),
            max_concurrent_runs: None,
        }
    }
}

impl ServiceConfig {
    /// Read `ARBITER_*` variables from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup("ARBITER_PROBLEMS_DIR") {
            config.problems_dir = PathBuf::from(dir);
        }
        if let Some(addr) = lookup("ARBITER_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(path) = lookup("ARBITER_ENGINE_CONFIG") {
            config.engine_config = PathBuf::from(path);
        }
        if let Some(raw) = lookup("ARBITER_MAX_CONCURRENT_RUNS") {
            let limit: usize = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid ARBITER_MAX_CONCURRENT_RUNS: {}", raw))?;
            // 0 reads as "no limit"
            config.max_concurrent_runs = (limit > 0).then_some(limit);
        }

        Ok(config)
    }
}
