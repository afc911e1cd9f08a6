//! Runtime A executor: validator scripts in an isolated OS subprocess.
//!
//! The script is written to a uniquely named temporary file and run by a
//! fixed Python driver that applies rlimits and an in-child alarm. The
//! parent enforces its own wall clock independently: if the child has not
//! exited by `timeout + grace` it is killed unconditionally, whether it is
//! computing or stuck. Communication is exit code plus one JSON object on
//! stdout; anything else is an error outcome, never an implicit allow.

use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, ValidationError};
use crate::sandbox::config::EngineConfig;
use crate::sandbox::dispatch::ValidatorPayload;
use crate::sandbox::outcome::{normalize_process_result, SandboxErrorKind, SandboxOutcome};

/// Fixed driver program loaded by every Runtime A subprocess.
const PYTHON_DRIVER: &str = include_str!("python_driver.py");

/// Executes Python validator scripts as isolated subprocesses.
pub struct ProcessExecutor {
    python_bin: PathBuf,
    driver_path: PathBuf,
    max_memory: u64,
    max_open_files: u32,
    max_processes: u32,
    kill_grace: Duration,
    // Owns the driver file and the per-invocation script files; dropped
    // with the executor.
    work_dir: TempDir,
}

impl ProcessExecutor {
    /// Create an executor, materializing the driver program on disk.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let work_dir = TempDir::new().map_err(|e| ValidationError::Internal(anyhow::anyhow!(e)))?;
        let driver_path = work_dir.path().join("python_driver.py");
        std::fs::write(&driver_path, PYTHON_DRIVER)
            .map_err(|e| ValidationError::Internal(anyhow::anyhow!(e)))?;

        Ok(Self {
            python_bin: config.python_bin.clone(),
            driver_path,
            max_memory: config.max_memory,
            max_open_files: config.max_open_files,
            max_processes: config.max_processes,
            kill_grace: config.kill_grace,
            work_dir,
        })
    }

    /// Run one validator script against the payload.
    ///
    /// Every failure mode is folded into a `SandboxOutcome`; the caller
    /// always gets exactly one terminal decision.
    pub async fn execute(
        &self,
        source: &[u8],
        payload: &ValidatorPayload,
        timeout: Duration,
    ) -> SandboxOutcome {
        // Unique per invocation so queued and running sandboxes never
        // collide; removed on drop on every exit path.
        let script = match self.write_script(source) {
            Ok(script) => script,
            Err(e) => {
                return SandboxOutcome::Error {
                    kind: SandboxErrorKind::Internal,
                    detail: format!("failed to stage validator script: {e}"),
                }
            }
        };

        let payload_json = match serde_json::to_string(payload) {
            Ok(json) => json,
            Err(e) => {
                return SandboxOutcome::Error {
                    kind: SandboxErrorKind::Internal,
                    detail: format!("failed to encode payload: {e}"),
                }
            }
        };

        let mut command = Command::new(&self.python_bin);
        command
            .arg(&self.driver_path)
            .arg(script.path())
            .arg(&payload_json)
            .env_clear()
            .env("VALIDATOR_TIMEOUT_MS", timeout.as_millis().to_string())
            .env("VALIDATOR_MAX_MEMORY_BYTES", self.max_memory.to_string())
            .env("VALIDATOR_MAX_OPEN_FILES", self.max_open_files.to_string())
            .env("VALIDATOR_MAX_PROCESSES", self.max_processes.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the child (e.g. when the deadline future wins)
            // delivers the unconditional kill signal.
            .kill_on_drop(true);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return SandboxOutcome::Error {
                    kind: SandboxErrorKind::Internal,
                    detail: format!("failed to spawn validator subprocess: {e}"),
                }
            }
        };

        debug!(script = %script.path().display(), timeout = ?timeout, "spawned python validator");

        let deadline = timeout + self.kill_grace;
        let output = match tokio::time::timeout(deadline, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return SandboxOutcome::Error {
                    kind: SandboxErrorKind::Internal,
                    detail: format!("failed to collect validator output: {e}"),
                }
            }
            Err(_elapsed) => {
                warn!(deadline = ?deadline, "validator subprocess killed at deadline");
                return SandboxOutcome::Error {
                    kind: SandboxErrorKind::Timeout,
                    detail: format!("validator killed after {}ms", deadline.as_millis()),
                };
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        match output.status.code() {
            Some(code) => normalize_process_result(code, &stdout, &stderr),
            // Killed by a signal before the host deadline (e.g. the
            // kernel's OOM response to the rlimit).
            None => SandboxOutcome::Error {
                kind: SandboxErrorKind::Crash,
                detail: format!("validator terminated by signal: {}", stderr.trim()),
            },
        }
    }

    fn write_script(&self, source: &[u8]) -> std::io::Result<tempfile::NamedTempFile> {
        let mut script = tempfile::Builder::new()
            .prefix("validator-")
            .suffix(".py")
            .tempfile_in(self.work_dir.path())?;
        script.write_all(source)?;
        script.flush()?;
        Ok(script)
    }
}
