//! Command job execution
//!
//! Spawns an external process with captured stdout/stderr and races its
//! exit against the per-job timeout and the task's cancel flag. The child
//! runs as its own process group so shell-forked grandchildren are stopped
//! with it. Stopping is always graceful first: SIGTERM to the group, a
//! fixed grace period, then a forced kill.

use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, warn};

use sluice_core::dto::task::CommandSpec;

use crate::scheduler::{JobOutcome, cancelled};

/// Grace period between the terminate signal and the forced kill
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Runs one command job to an outcome; never panics the owning task
pub(crate) async fn run_command(
    spec: CommandSpec,
    cancel: &mut watch::Receiver<bool>,
) -> JobOutcome {
    let mut command = build_command(&spec);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => return JobOutcome::Failed(format!("failed to spawn '{}': {err}", spec.command)),
    };

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let timeout = async {
        match spec.timeout() {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(timeout);

    enum Waited {
        Exited(std::process::ExitStatus),
        TimedOut,
        Cancelled,
    }

    let waited = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => Waited::Exited(status),
            Err(err) => return JobOutcome::Failed(format!("failed to await child: {err}")),
        },
        _ = &mut timeout => Waited::TimedOut,
        _ = cancelled(cancel) => Waited::Cancelled,
    };

    match waited {
        Waited::Exited(status) => {
            let stdout = stdout.await.unwrap_or_default();
            let stderr = stderr.await.unwrap_or_default();
            let code = status.code().unwrap_or(-1);

            if status.success() {
                debug!("Command '{}' completed", spec.command);
                JobOutcome::Completed(serde_json::json!({
                    "exit_code": code,
                    "stdout": stdout,
                }))
            } else {
                JobOutcome::Failed(format!(
                    "command exited with code {}: {}",
                    code,
                    stderr.trim()
                ))
            }
        }
        Waited::TimedOut => {
            warn!(
                "Command '{}' exceeded its {:?} timeout, stopping it",
                spec.command,
                spec.timeout()
            );
            graceful_stop(&mut child).await;
            // An orphaned grandchild could hold the pipes open past the
            // kill; the captured output is lost either way.
            stdout.abort();
            stderr.abort();
            JobOutcome::Failed(format!(
                "command timed out after {:?}",
                spec.timeout().unwrap_or_default()
            ))
        }
        Waited::Cancelled => {
            debug!("Command '{}' cancelled, stopping it", spec.command);
            graceful_stop(&mut child).await;
            stdout.abort();
            stderr.abort();
            JobOutcome::Cancelled
        }
    }
}

fn build_command(spec: &CommandSpec) -> Command {
    let mut command = if spec.shell {
        let mut command = Command::new("sh");
        command.arg("-c").arg(&spec.command);
        command
    } else {
        let mut parts = spec.command.split_whitespace();
        let program = parts.next().unwrap_or("");
        let mut command = Command::new(program);
        command.args(parts);
        command
    };

    command
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group, so a graceful stop reaches shell-forked
    // grandchildren and not just the immediate child.
    #[cfg(unix)]
    command.process_group(0);
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }
    command
}

/// Terminate signal to the child's process group, bounded grace, then
/// forced kill of the whole group
async fn graceful_stop(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: signalling the process group we created at spawn.
        unsafe {
            libc::killpg(pid as i32, libc::SIGTERM);
        }
        if tokio::time::timeout(STOP_GRACE, child.wait()).await.is_err() {
            warn!("Child {} ignored SIGTERM, killing its group", pid);
        }
        // Surviving group members would otherwise hold pipes open.
        unsafe {
            libc::killpg(pid as i32, libc::SIGKILL);
        }
        let _ = child.wait().await;
        return;
    }

    let _ = child.start_kill();
    let _ = child.wait().await;
}

/// Reads a captured stream to the end without blocking the job race
fn drain<R>(stream: Option<R>) -> tokio::task::JoinHandle<String>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut stream) = stream {
            let _ = stream.read_to_end(&mut buf).await;
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}
