// Engine configuration for the Arbiter judge
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// How to launch the candidate language's interpreter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpreterConfig {
    pub command: String,
    pub args: Vec<String>,
    pub file_extension: String,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            command: "python3".to_string(),
            // isolated mode, no .pyc writes
            args: vec!["-I".to_string(), "-B".to_string()],
            file_extension: "py".to_string(),
        }
    }
}

/// Resource bounds applied to every spawned program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    pub cpu_time_secs: u64,
    pub memory_limit_mb: u64,
    pub max_processes: Option<u64>,
    pub max_output_bytes: usize,
    pub deny_network: bool,
    /// Run inside a private mount namespace rooted at a per-run jail.
    pub isolate_filesystem: bool,
    /// Host paths bind-mounted read-only into the jail. The interpreter's
    /// install prefix is added automatically.
    pub read_only_paths: Vec<PathBuf>,
    /// Fail the case when a limit cannot be applied instead of running without it.
    pub strict: bool,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu_time_secs: 3,
            memory_limit_mb: 256,
            max_processes: None,
            max_output_bytes: 1024 * 1024,
            deny_network: true,
            isolate_filesystem: true,
            read_only_paths: ["/usr", "/bin", "/lib", "/lib64", "/etc/ld.so.cache"]
                .iter()
                .map(PathBuf::from)
                .collect(),
            strict: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub interpreter: InterpreterConfig,
    pub timeout_ms: u64,
    pub limits: ResourceLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interpreter: InterpreterConfig::default(),
            timeout_ms: 2000,
            limits: ResourceLimits::default(),
        }
    }
}

impl EngineConfig {
    /// Load engine configuration from a JSON file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Engine config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: EngineConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to built-in defaults.
    /// Environment overrides are applied either way.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            info!(path = %path.display(), "Loading engine configuration");
            Self::load(path)?
        } else {
            warn!(path = %path.display(), "Engine config not found, using defaults");
            Self::default()
        };

        let config = config.with_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `ARBITER_TIMEOUT_MS` and `ARBITER_PYTHON`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("ARBITER_TIMEOUT_MS") {
            self.timeout_ms = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid ARBITER_TIMEOUT_MS: {}", raw))?;
        }
        if let Some(command) = lookup("ARBITER_PYTHON") {
            self.interpreter.command = command;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            bail!("timeout_ms must be greater than zero");
        }
        if self.interpreter.command.trim().is_empty() {
            bail!("interpreter.command cannot be empty");
        }
        if self.limits.memory_limit_mb == 0 {
            bail!("limits.memory_limit_mb must be greater than zero");
        }
        if self.limits.cpu_time_secs == 0 {
            bail!("limits.cpu_time_secs must be greater than zero");
        }
        if let Some(path) = self.limits.read_only_paths.iter().find(|p| !p.is_absolute()) {
            bail!("limits.read_only_paths must be absolute: {}", path.display());
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
