//! Shell command execution via `tokio::process::Command`.
//!
//! Every command runs in its own process group so a timeout or
//! cancellation kills the whole subprocess tree, not just the shell.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ExecConfig;
use crate::error::ExecError;

/// Sentinel exit code recorded when the process was killed by us
/// (timeout) or died to a signal without reporting a code.
pub const KILLED_EXIT_CODE: i32 = -1;

/// Captured outcome of one command invocation.
///
/// A non-zero exit code is data, not an error; only spawn failures
/// surface as [`ExecError`].
#[derive(Clone, Debug)]
pub struct ExecutionResult {
    pub command: String,
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
    pub timed_out: bool,
}

impl ExecutionResult {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    #[must_use]
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    #[must_use]
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Runs a single shell command to completion.
///
/// Implemented by [`ShellRunner`] for real execution and by spy runners
/// in tests.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        command: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<ExecutionResult, ExecError>> + Send;
}

/// Real runner: `$SHELL -c <command>` with stdin closed, output captured,
/// and process-group teardown on timeout or cancel.
#[derive(Clone, Debug)]
pub struct ShellRunner {
    shell: String,
    timeout: Duration,
}

impl ShellRunner {
    #[must_use]
    pub fn new(config: &ExecConfig) -> Self {
        let shell = config
            .shell
            .clone()
            .or_else(|| std::env::var("SHELL").ok())
            .unwrap_or_else(|| "/bin/sh".to_string());
        Self {
            shell,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    #[must_use]
    pub fn shell(&self) -> &str {
        &self.shell
    }
}

impl CommandRunner for ShellRunner {
    async fn run(
        &self,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecError> {
        let start = Instant::now();

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(ExecError::LaunchFailure)?;
        tracing::debug!(command, shell = %self.shell, "spawned command");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_task = drain(stdout);
        let stderr_task = drain(stderr);

        let deadline = tokio::time::Instant::now() + self.timeout;

        let (exit_code, timed_out) = tokio::select! {
            status = child.wait() => {
                let status = status.map_err(ExecError::LaunchFailure)?;
                (status.code().unwrap_or(KILLED_EXIT_CODE), false)
            }
            () = tokio::time::sleep_until(deadline) => {
                tracing::warn!(command, timeout_secs = self.timeout.as_secs(), "command timed out, killing process group");
                kill_process_group(&mut child);
                let _ = child.wait().await;
                (KILLED_EXIT_CODE, true)
            }
            () = cancel.cancelled() => {
                tracing::info!(command, "command cancelled, killing process group");
                kill_process_group(&mut child);
                let _ = child.wait().await;
                return Err(ExecError::Cancelled);
            }
        };

        // A surviving grandchild can hold the pipes open past the shell's
        // exit; never wait for it beyond the deadline.
        let stdout = collect(stdout_task, deadline).await;
        let stderr = collect(stderr_task, deadline).await;

        Ok(ExecutionResult {
            command: command.to_string(),
            exit_code,
            stdout,
            stderr,
            duration: start.elapsed(),
            timed_out,
        })
    }
}

fn drain(
    stream: Option<impl AsyncReadExt + Unpin + Send + 'static>,
) -> Option<JoinHandle<Vec<u8>>> {
    stream.map(|mut stream| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stream.read_to_end(&mut buf).await;
            buf
        })
    })
}

async fn collect(task: Option<JoinHandle<Vec<u8>>>, deadline: tokio::time::Instant) -> Vec<u8> {
    let Some(task) = task else {
        return Vec::new();
    };
    // Short grace past the deadline so the drain task can observe EOF
    // after a group kill.
    let cutoff = deadline + Duration::from_millis(250);
    match tokio::time::timeout_at(cutoff, task).await {
        Ok(joined) => joined.unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}

/// SIGKILL the child's whole process group. The child was spawned with
/// `process_group(0)`, so its pid is the pgid of everything it forked.
#[cfg(unix)]
fn kill_process_group(child: &mut Child) {
    if let Some(pid) = child.id() {
        #[allow(clippy::cast_possible_wrap)]
        let pid = pid as libc::pid_t;
        let pgid = unsafe { libc::getpgid(pid) };
        if pgid > 0 {
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) {
    let _ = child.start_kill();
}
