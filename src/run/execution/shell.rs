use std::{io, path::Path, process::{Output, Stdio}, time::Duration};

use tokio::{io::{AsyncRead, AsyncReadExt}, process::Child};

use crate::run::execution::{in_directory, CommandExecutor, PendingTask, TaskFailure, TaskOutcome};

/// Runs commands through `sh -c`, capturing stdout and stderr together.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellExecutor {
    /// Child processes still running after this long are killed, along with
    /// anything they started, and reported as failed. Only applies to
    /// asynchronous runs.
    pub timeout: Option<Duration>,
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Runs `command` to completion and returns its combined output.
    pub fn run(&self, command: &str) -> Result<String, TaskFailure> {
        log::debug!("sh -c {command:?}");
        let output = std::process::Command::new("sh")
            .arg("-c")
            .arg(merged_script(command))
            .stdin(Stdio::null())
            .output()
            .map_err(|e| TaskFailure::Spawn(e.to_string()))?;
        into_result(output)
    }

    pub fn run_in_directory(&self, dir: &Path, command: &str) -> Result<String, TaskFailure> {
        self.run(&in_directory(dir, command)?)
    }
}

impl CommandExecutor for ShellExecutor {
    fn run_async(&self, command: String) -> PendingTask {
        let timeout = self.timeout;
        Box::pin(async move {
            log::debug!("sh -c {command:?} (async)");
            let mut cmd = tokio::process::Command::new("sh");
            cmd.arg("-c")
                .arg(merged_script(&command))
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);
            // a timed out command is killed together with everything it started
            #[cfg(unix)]
            if timeout.is_some() {
                cmd.process_group(0);
            }
            let mut child = match cmd.spawn() {
                Ok(child) => child,
                Err(e) => return TaskOutcome::Failure(TaskFailure::Spawn(e.to_string())),
            };

            // the group outlives `sh` when it exits before its background jobs
            let group = child.id();

            let output = match timeout {
                Some(limit) => {
                    let collected = tokio::time::timeout(limit, collect_output(&mut child)).await;
                    match collected {
                        Ok(output) => output,
                        Err(_) => {
                            log::warn!("killing {command:?} after {limit:?}");
                            if let Err(e) = kill_process_group(group) {
                                log::error!("failed to kill the process group of {command:?}: {e}");
                            }
                            if let Err(e) = child.kill().await {
                                log::debug!("{command:?} already gone: {e}");
                            }
                            return TaskOutcome::Failure(TaskFailure::Timeout(limit));
                        }
                    }
                }
                None => collect_output(&mut child).await,
            };

            match output {
                Ok(output) => match into_result(output) {
                    Ok(text) => TaskOutcome::Success(text),
                    Err(failure) => TaskOutcome::Failure(failure),
                },
                Err(e) => TaskOutcome::Failure(TaskFailure::Spawn(e.to_string())),
            }
        })
    }
}

/// Waits for `child` while draining both of its pipes.
async fn collect_output(child: &mut Child) -> io::Result<Output> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (status, stdout, stderr) = tokio::join!(child.wait(), read_pipe(stdout), read_pipe(stderr));
    Ok(Output {
        status: status?,
        stdout: stdout?,
        stderr: stderr?,
    })
}

async fn read_pipe(pipe: Option<impl AsyncRead + Unpin>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

#[cfg(unix)]
fn kill_process_group(group: Option<u32>) -> io::Result<()> {
    let Some(pid) = group else {
        return Ok(());
    };
    // the child leads its own group, see `process_group(0)`
    let result = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if result == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn kill_process_group(_: Option<u32>) -> io::Result<()> {
    Ok(())
}

/// Wraps the user command so its stderr lands in the same pipe as stdout.
/// The newline keeps a trailing comment in `command` from eating the brace.
fn merged_script(command: &str) -> String {
    format!("{{ {command}\n}} 2>&1")
}

fn into_result(output: Output) -> Result<String, TaskFailure> {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    // whatever the shell itself printed, e.g. a failing `cd`
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    let text = text.trim_end().to_string();

    if output.status.success() {
        Ok(text)
    } else {
        Err(TaskFailure::Exit {
            code: output.status.code(),
            output: text,
        })
    }
}
