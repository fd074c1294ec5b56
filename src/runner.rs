//! Child-process runner for helper scripts.
//!
//! Runs a program to completion and captures its stdout. Used by peripheral
//! endpoints; the scripts themselves live outside the server.

use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::config::MAX_SCRIPT_OUTPUT_BYTES;

/// Bytes of stderr kept for error reports; the rest is discarded
const STDERR_CAPTURE_BYTES: u64 = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("failed to start process: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("failed to read process output: {0}")]
    Io(std::io::Error),

    #[error("process exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("process output exceeded {limit} bytes")]
    OutputTooLarge { limit: usize },

    #[error("process output is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct ScriptRunner {
    max_output: usize,
}

impl Default for ScriptRunner {
    fn default() -> Self {
        Self {
            max_output: MAX_SCRIPT_OUTPUT_BYTES,
        }
    }
}

impl ScriptRunner {
    pub fn with_max_output(max_output: usize) -> Self {
        Self { max_output }
    }

    /// Runs `program` with `args` and returns its stdout.
    ///
    /// At most `max_output + 1` bytes of stdout are ever buffered. A process
    /// that writes more is killed.
    pub async fn run(&self, program: &str, args: &[&str]) -> Result<Vec<u8>, RunnerError> {
        tracing::debug!(program, ?args, "Running helper process");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let limit = self.max_output;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let read_stdout = async move {
            let mut buf = Vec::new();
            if let Some(stdout) = stdout {
                stdout
                    .take(limit as u64 + 1)
                    .read_to_end(&mut buf)
                    .await
                    .map_err(RunnerError::Io)?;
            }
            if buf.len() > limit {
                return Err(RunnerError::OutputTooLarge { limit });
            }
            Ok::<_, RunnerError>(buf)
        };

        let read_stderr = async move {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                (&mut stderr)
                    .take(STDERR_CAPTURE_BYTES)
                    .read_to_end(&mut buf)
                    .await
                    .map_err(RunnerError::Io)?;
                // Keep draining so the child never blocks on a full pipe.
                tokio::io::copy(&mut stderr, &mut tokio::io::sink())
                    .await
                    .map_err(RunnerError::Io)?;
            }
            Ok::<_, RunnerError>(buf)
        };

        let (stdout, stderr) = match tokio::try_join!(read_stdout, read_stderr) {
            Ok(output) => output,
            Err(e) => {
                if let Err(kill_err) = child.start_kill() {
                    tracing::debug!(error = %kill_err, "Helper process already exited");
                }
                return Err(e);
            }
        };

        let status = child.wait().await.map_err(RunnerError::Io)?;
        if !status.success() {
            return Err(RunnerError::Failed {
                status: status.to_string(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        Ok(stdout)
    }

    /// Runs `program` and parses its stdout as JSON.
    pub async fn run_json(&self, program: &str, args: &[&str]) -> Result<serde_json::Value, RunnerError> {
        let stdout = self.run(program, args).await?;
        Ok(serde_json::from_slice(&stdout)?)
    }
}
