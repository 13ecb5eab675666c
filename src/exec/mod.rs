//! External process execution for tools.
//!
//! Every tool that touches the cluster ends up here. The executor enforces a
//! per-command timeout, kills the child's process group on timeout or
//! cancellation, and captures stdout and stderr separately, each bounded to a
//! fixed size.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{AgentConfig, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TOOL_TIMEOUT};
use crate::error::{KubeAgentError, Result};
use crate::util::truncate::{mark_truncated, truncate_utf8};

const READ_CHUNK: usize = 8 * 1024;

/// A process to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
    /// Overrides the executor's default timeout.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            timeout: None,
        }
    }

    /// Run `script` through `sh -c`.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(script)
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

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Captured result of a process that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub truncated: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Executor limits.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    pub default_timeout: Duration,
    /// Per-stream capture bound.
    pub max_output_bytes: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TOOL_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl From<&AgentConfig> for ExecutorConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            default_timeout: config.tool_timeout,
            max_output_bytes: config.max_output_bytes,
        }
    }
}

/// Runs external commands with bounded time and output.
#[derive(Debug, Clone, Default)]
pub struct CommandExecutor {
    config: ExecutorConfig,
}

impl CommandExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Launch `spec` and wait for it.
    ///
    /// A non-zero exit is not an error here; callers inspect
    /// [`CommandOutput::exit_code`]. Errors are spawn failures
    /// (`ToolExecution`), timeouts (`ToolTimeout`) and cancellation
    /// (`Canceled`); in the last two cases the child's whole process group
    /// has been killed and its partial output discarded.
    ///
    /// The timeout covers draining stdout and stderr as well as the child's
    /// exit, so a descendant that keeps a pipe open cannot outlive it.
    pub async fn run(
        &self,
        tool_name: &str,
        spec: CommandSpec,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput> {
        if cancel.is_cancelled() {
            return Err(KubeAgentError::Canceled);
        }

        let timeout = spec.timeout.unwrap_or(self.config.default_timeout);
        let limit = self.config.max_output_bytes;
        debug!(tool = tool_name, program = %spec.program, args = ?spec.args, "spawning command");

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // The child leads a fresh group so pipelines and background jobs die with it.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| {
            KubeAgentError::tool_execution(tool_name, format!("{}: {e}", spec.program))
        })?;
        let group = child.id();

        let mut stdin_task = match (spec.stdin, child.stdin.take()) {
            (Some(input), Some(mut pipe)) => Some(tokio::spawn(async move {
                // A child that exits without draining stdin yields a broken
                // pipe; its exit status already reports the problem.
                let _ = pipe.write_all(input.as_bytes()).await;
                let _ = pipe.shutdown().await;
            })),
            _ => None,
        };
        let mut stdout_task = child
            .stdout
            .take()
            .map(|pipe| tokio::spawn(read_bounded(pipe, limit)));
        let mut stderr_task = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(read_bounded(pipe, limit)));

        let started = Instant::now();
        let finished = tokio::select! {
            finished = async {
                let status = child
                    .wait()
                    .await
                    .map_err(|e| KubeAgentError::tool_execution(tool_name, e.to_string()))?;
                let stdout = collect(stdout_task.as_mut(), limit).await;
                let stderr = collect(stderr_task.as_mut(), limit).await;
                if let Some(task) = stdin_task.as_mut() {
                    let _ = task.await;
                }
                Ok::<_, KubeAgentError>((status, stdout, stderr))
            } => finished,
            _ = tokio::time::sleep(timeout) => {
                warn!(tool = tool_name, timeout_ms = timeout.as_millis() as u64, "command timed out, killing");
                Err(KubeAgentError::ToolTimeout {
                    tool_name: tool_name.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
            _ = cancel.cancelled() => {
                warn!(tool = tool_name, "run canceled, killing command");
                Err(KubeAgentError::Canceled)
            }
        };

        let (status, (stdout, stdout_truncated), (stderr, stderr_truncated)) = match finished {
            Ok(finished) => finished,
            Err(err) => {
                kill_group(&mut child, group).await;
                if let Some(task) = &stdin_task {
                    task.abort();
                }
                for task in [&stdout_task, &stderr_task].into_iter().flatten() {
                    task.abort();
                }
                return Err(err);
            }
        };

        debug!(
            tool = tool_name,
            exit_code = ?status.code(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            stdout_len = stdout.len(),
            stderr_len = stderr.len(),
            "command finished"
        );

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code: status.code(),
            truncated: stdout_truncated || stderr_truncated,
        })
    }
}

/// SIGKILL the child's process group, then the child itself.
async fn kill_group(child: &mut Child, group: Option<u32>) {
    #[cfg(unix)]
    if let Some(pgid) = group.and_then(|id| libc::pid_t::try_from(id).ok()) {
        // SAFETY: killpg takes no pointers; a stale group id only yields ESRCH.
        unsafe {
            libc::killpg(pgid, libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    let _ = group;
    let _ = child.kill().await;
}

/// Bytes kept from a stream plus the total number of bytes it produced.
struct Captured {
    kept: Vec<u8>,
    total: usize,
}

/// Drain `reader`, keeping at most `limit` bytes (plus room to finish a
/// codepoint) and counting the rest.
async fn read_bounded<R>(mut reader: R, limit: usize) -> std::io::Result<Captured>
where
    R: AsyncRead + Unpin,
{
    let keep_cap = limit.saturating_add(3);
    let mut kept = Vec::with_capacity(keep_cap.min(READ_CHUNK));
    let mut total = 0usize;
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        total += n;
        let room = keep_cap.saturating_sub(kept.len());
        kept.extend_from_slice(&buf[..n.min(room)]);
    }
    Ok(Captured { kept, total })
}

async fn collect(
    task: Option<&mut JoinHandle<std::io::Result<Captured>>>,
    limit: usize,
) -> (String, bool) {
    let captured = match task {
        Some(task) => match task.await {
            Ok(Ok(captured)) => captured,
            Ok(Err(e)) => return (format!("<failed to read output: {e}>"), false),
            Err(_) => return (String::new(), false),
        },
        None => return (String::new(), false),
    };

    let text = String::from_utf8_lossy(&captured.kept);
    if captured.total <= limit {
        return (text.into_owned(), false);
    }
    let kept = truncate_utf8(&text, limit);
    let omitted = captured.total.saturating_sub(kept.len());
    (mark_truncated(kept, omitted), true)
}
