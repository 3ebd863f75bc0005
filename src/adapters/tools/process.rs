//! Child process runner for the dump/load tools

use crate::domain::{CopyError, ProcessTimeout, Result, ShroudError};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Grace period for the pipe readers once the child has been killed
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// One invocation of an external tool
#[derive(Debug, Clone)]
pub struct ToolCommand {
    /// Name used in errors and logs (`pg_dump`, `mysql`, ...)
    pub tool: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    /// File fed to the child's standard input
    pub stdin: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new(tool: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn stdin_file(mut self, path: &Path) -> Self {
        self.stdin = Some(path.to_path_buf());
        self
    }
}

/// What a successful run produced
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Runs a tool to completion
///
/// Non-zero exit is a [`CopyError::ProcessFailed`]; running past `timeout`
/// kills the child and yields [`ShroudError::Timeout`] with whatever output was
/// captured.
pub async fn run_tool(command: &ToolCommand, timeout: Duration) -> Result<ProcessOutcome> {
    let start = Instant::now();
    tracing::debug!(
        tool = %command.tool,
        program = %command.program.display(),
        args = ?command.args,
        "Starting external tool"
    );

    let stdin = match &command.stdin {
        Some(path) => Stdio::from(std::fs::File::open(path).map_err(|e| {
            ShroudError::Io(format!("Failed to open {}: {}", path.display(), e))
        })?),
        None => Stdio::null(),
    };

    let mut child = Command::new(&command.program)
        .args(&command.args)
        .envs(command.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            ShroudError::Io(format!(
                "Failed to start {} ({}): {}",
                command.tool,
                command.program.display(),
                e
            ))
        })?;

    let stdout = Captured::spawn(child.stdout.take());
    let stderr = Captured::spawn(child.stderr.take());

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => {
            let status = status.map_err(|e| {
                ShroudError::Io(format!("Failed to wait for {}: {}", command.tool, e))
            })?;
            let stdout = stdout.finish(None).await;
            let stderr = stderr.finish(None).await;

            if !status.success() {
                return Err(CopyError::ProcessFailed {
                    tool: command.tool.clone(),
                    exit_code: status.code(),
                    stdout,
                    stderr,
                }
                .into());
            }

            let duration = start.elapsed();
            tracing::debug!(
                tool = %command.tool,
                duration_ms = duration.as_millis() as u64,
                "External tool finished"
            );
            Ok(ProcessOutcome {
                stdout,
                stderr,
                duration,
            })
        }
        Err(_) => {
            tracing::error!(tool = %command.tool, timeout_s = timeout.as_secs(), "External tool timed out");
            if let Err(e) = child.kill().await {
                tracing::warn!(tool = %command.tool, error = %e, "Failed to kill timed out tool");
            }
            let exit_code = child.try_wait().ok().flatten().and_then(|s| s.code());
            Err(ProcessTimeout {
                tool: command.tool.clone(),
                timeout,
                exit_code,
                stdout: stdout.finish(Some(DRAIN_GRACE)).await,
                stderr: stderr.finish(Some(DRAIN_GRACE)).await,
            }
            .into())
        }
    }
}

/// Output of one pipe, collected by a background reader
struct Captured {
    buffer: Arc<Mutex<Vec<u8>>>,
    reader: Option<JoinHandle<()>>,
}

impl Captured {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let reader = pipe.map(|mut pipe| {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match pipe.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buffer
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .extend_from_slice(&chunk[..n]),
                    }
                }
            })
        });
        Self { buffer, reader }
    }

    /// Waits for the reader (at most `grace`, if given) and returns the text
    ///
    /// A grandchild may keep the pipe open after its parent was killed, hence
    /// the bounded wait on timeout.
    async fn finish(self, grace: Option<Duration>) -> String {
        if let Some(reader) = self.reader {
            match grace {
                Some(grace) => {
                    let abort = reader.abort_handle();
                    if tokio::time::timeout(grace, reader).await.is_err() {
                        abort.abort();
                    }
                }
                None => {
                    let _ = reader.await;
                }
            }
        }
        let bytes = self
            .buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
