//! Execution Engine - runs one assembled program and captures raw output.
//!
//! **Architectural boundary:**
//! - Engine knows HOW to execute (local interpreter, resource limits,
//!   filesystem jail, timeout)
//! - Engine does NOT know test cases or expected outputs
//! - Engine never returns an error: spawn and I/O failures come back as
//!   `RunOutcome::Internal` so the evaluator can turn them into a verdict entry

use crate::config::EngineConfig;
use crate::sandbox::{
    kill_process_group, Isolation, IsolationReport, JailPlan, SandboxPolicy, JAIL_DEVICES,
};
use anyhow::{bail, Context, Result};
use std::future::Future;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

/// Programs larger than this are rejected before anything is spawned.
const MAX_PROGRAM_BYTES: usize = 1024 * 1024; // 1MB

const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// Raw result of a program that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub execution_time_ms: u64,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && self.signal.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(ProcessOutput),
    TimedOut { execution_time_ms: u64 },
    Internal(String),
}

/// Backend that runs an assembled program in isolation.
///
/// Swappable so the aggregation logic can be exercised without a real
/// interpreter.
pub trait ExecutionEngine: Send + Sync {
    fn execute(&self, program: &str) -> impl Future<Output = RunOutcome> + Send;

    /// Wall-clock bound applied to each execution.
    fn timeout(&self) -> Duration;
}

/// Kills the child's whole process group when dropped.
///
/// Covers every exit path: normal completion (stray descendants), timeout,
/// I/O failure and the caller dropping the evaluation future. An already
/// empty group is left alone.
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            if kill_process_group(pgid) {
                debug!(pgid, "Killed leftover processes");
            }
        }
    }
}

/// Runs programs as local interpreter processes under a `SandboxPolicy`.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    config: EngineConfig,
    policy: SandboxPolicy,
    scratch_root: Option<PathBuf>,
    /// Absolute interpreter path when it could be resolved from `PATH`.
    program: PathBuf,
    read_only_paths: Vec<PathBuf>,
    degraded_reported: Arc<AtomicBool>,
}

impl ProcessEngine {
    pub fn new(config: EngineConfig) -> Self {
        let policy = SandboxPolicy::from_limits(&config.limits);
        let resolved = resolve_program(&config.interpreter.command);

        // a symlinked interpreter needs both its own and its target's prefix
        let mut read_only_paths = config.limits.read_only_paths.clone();
        if let Some(found) = &resolved {
            let target = found.canonicalize().ok();
            read_only_paths.extend(
                [Some(found.as_path()), target.as_deref()]
                    .into_iter()
                    .flatten()
                    .filter_map(install_prefix),
            );
        }
        let read_only_paths = outermost(read_only_paths);

        let program = resolved.unwrap_or_else(|| PathBuf::from(&config.interpreter.command));
        debug!(
            program = %program.display(),
            read_only = ?read_only_paths,
            "Process engine ready"
        );

        Self {
            config,
            policy,
            scratch_root: None,
            program,
            read_only_paths,
            degraded_reported: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create per-run directories under `root` instead of the system temp dir.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run an empty program and return the isolation it actually received.
    pub async fn check_isolation(&self) -> Result<Isolation> {
        let (outcome, granted) = self.run("pass\n").await?;
        if let RunOutcome::Completed(output) = &outcome {
            if !output.success() {
                bail!("Interpreter failed: {}", output.stderr.trim());
            }
        }
        granted.context("Sandbox did not report its isolation")
    }

    fn scratch_dir(&self, prefix: &str) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .context("Failed to create scratch directory")
    }

    fn note_isolation(&self, granted: Option<Isolation>, jailed: bool) {
        let requested = self.policy.requested(jailed);
        match granted {
            Some(granted) if granted.covers(requested) => {
                debug!(?granted, "Sandbox isolation in effect");
            }
            _ => {
                if !self.degraded_reported.swap(true, Ordering::Relaxed) {
                    warn!(
                        ?requested,
                        ?granted,
                        "Sandbox isolation degraded - candidate programs can reach the host"
                    );
                }
            }
        }
    }

    async fn run(&self, program: &str) -> Result<(RunOutcome, Option<Isolation>)> {
        if program.len() > MAX_PROGRAM_BYTES {
            bail!("Program exceeds maximum size of {} bytes", MAX_PROGRAM_BYTES);
        }

        let interpreter = &self.config.interpreter;

        // Unique per run; removed with its contents when dropped.
        let workdir = self.scratch_dir("arbiter-")?;
        let workdir_path = workdir
            .path()
            .canonicalize()
            .context("Failed to resolve scratch directory")?;

        let script = workdir_path.join(format!("solution.{}", interpreter.file_extension));
        tokio::fs::write(&script, program)
            .await
            .with_context(|| format!("Failed to write {}", script.display()))?;

        let (_jail_root, jail) = if self.config.limits.isolate_filesystem {
            let root = self.scratch_dir("arbiter-jail-")?;
            let devices: Vec<PathBuf> = JAIL_DEVICES.iter().map(PathBuf::from).collect();
            let plan =
                JailPlan::prepare(root.path(), &self.read_only_paths, &devices, &workdir_path)
                    .context("Failed to prepare filesystem jail")?;
            (Some(root), Some(plan))
        } else {
            (None, None)
        };
        let jailed = jail.is_some();

        let path_env = std::env::var("PATH")
            .unwrap_or_else(|_| "/usr/local/bin:/usr/bin:/bin".to_string());

        let report = IsolationReport::new().context("Failed to create isolation report pipe")?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&interpreter.args)
            .arg(&script)
            .current_dir(&workdir_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear()
            .env("PATH", &path_env)
            .kill_on_drop(true);
        self.policy.apply(&mut cmd, jail, &report);

        let start = Instant::now();
        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {}", interpreter.command))?;
        let _guard = ProcessGroupGuard::new(child.id());

        let granted = report.collect();
        self.note_isolation(granted, jailed);

        debug!(pid = ?child.id(), script = %script.display(), "Program started");

        let stdout = child.stdout.take().context("stdout was not captured")?;
        let stderr = child.stderr.take().context("stderr was not captured")?;
        let limit = self.config.limits.max_output_bytes;

        let collect = async {
            tokio::try_join!(
                read_capped(stdout, limit),
                read_capped(stderr, limit),
                child.wait(),
            )
        };

        let timeout = self.config.timeout();
        let waited = tokio::time::timeout(timeout, collect).await;

        let outcome = match waited {
            Ok(Ok((stdout, stderr, status))) => {
                let execution_time_ms = start.elapsed().as_millis() as u64;
                debug!(
                    execution_ms = execution_time_ms,
                    exit_code = ?status.code(),
                    signal = ?status.signal(),
                    "Program finished"
                );

                RunOutcome::Completed(ProcessOutput {
                    stdout,
                    stderr,
                    exit_code: status.code(),
                    signal: status.signal(),
                    execution_time_ms,
                })
            }
            Ok(Err(e)) => return Err(e).context("Failed to collect program output"),
            Err(_) => {
                let execution_time_ms = start.elapsed().as_millis() as u64;
                warn!(
                    execution_ms = execution_time_ms,
                    timeout_ms = timeout.as_millis() as u64,
                    "Execution timed out - killing process group"
                );

                // leader is not reaped yet, so the group id is still ours
                if let Some(pid) = child.id() {
                    kill_process_group(pid);
                }
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to reap timed-out process");
                }

                RunOutcome::TimedOut { execution_time_ms }
            }
        };

        Ok((outcome, granted))
    }
}

/// Absolute path of `command`, searched in `PATH` when bare.
fn resolve_program(command: &str) -> Option<PathBuf> {
    if command.contains('/') {
        let path = std::path::absolute(command).ok()?;
        return path.is_file().then_some(path);
    }
    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .map(|dir| dir.join(command))
        .find(|candidate| candidate.is_absolute() && candidate.is_file())
}

/// `/opt/py/bin/python3` lives under `/opt/py`, which also holds its stdlib.
fn install_prefix(program: &Path) -> Option<PathBuf> {
    let prefix = program.parent()?.parent()?;
    (prefix != Path::new("/")).then(|| prefix.to_path_buf())
}

/// Drop duplicates and paths already covered by a parent in the list.
fn outermost(mut paths: Vec<PathBuf>) -> Vec<PathBuf> {
    paths.sort();
    paths.dedup();
    let mut kept: Vec<PathBuf> = Vec::new();
    for path in paths {
        if !kept.iter().any(|parent| path.starts_with(parent)) {
            kept.push(path);
        }
    }
    kept
}

impl ExecutionEngine for ProcessEngine {
    async fn execute(&self, program: &str) -> RunOutcome {
        match self.run(program).await {
            Ok((outcome, _)) => outcome,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Execution infrastructure failure");
                RunOutcome::Internal(format!("{:#}", e))
            }
        }
    }

    fn timeout(&self) -> Duration {
        self.config.timeout()
    }
}

/// Read at most `limit` bytes, then drain the rest so the writer never blocks.
async fn read_capped<R>(mut reader: R, limit: usize) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    (&mut reader).take(limit as u64).read_to_end(&mut buf).await?;
    let overflow = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;

    let mut text = String::from_utf8_lossy(&buf).into_owned();
    if overflow > 0 {
        text.push_str(TRUNCATION_MARKER);
    }
    Ok(text)
}
