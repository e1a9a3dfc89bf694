use std::{fmt::Display, future::Future, path::{Path, PathBuf}, pin::Pin, time::Duration};

pub mod shell;

pub use shell::ShellExecutor;

/// A dispatched command that has not been awaited yet.
pub type PendingTask = Pin<Box<dyn Future<Output = TaskOutcome> + Send>>;

/// Starts commands without waiting for them.
///
/// Both success and failure are delivered through the returned
/// [`PendingTask`], so the caller can join a set of them uniformly.
pub trait CommandExecutor: Send + Sync + 'static {
    fn run_async(&self, command: String) -> PendingTask;

    fn run_in_directory_async(&self, dir: PathBuf, command: String) -> PendingTask {
        match in_directory(&dir, &command) {
            Ok(command) => self.run_async(command),
            Err(failure) => Box::pin(async move { TaskOutcome::Failure(failure) }),
        }
    }
}

/// Prefixes `command` with a `cd` into `dir`, evaluated by the same shell.
pub fn in_directory(dir: &Path, command: &str) -> Result<String, TaskFailure> {
    let dir = dir
        .to_str()
        .ok_or_else(|| TaskFailure::Spawn(format!("non UTF-8 directory {}", dir.display())))?;
    let quoted = shlex::try_quote(dir)
        .map_err(|e| TaskFailure::Spawn(format!("cannot quote directory {dir}: {e}")))?;
    Ok(format!("cd {quoted} && {command}"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success(String),
    Failure(TaskFailure),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success(_))
    }

    /// The text reported for this outcome: the captured output, or the
    /// failure description when the command produced nothing.
    pub fn text(&self) -> String {
        match self {
            TaskOutcome::Success(output) => output.clone(),
            TaskOutcome::Failure(TaskFailure::Exit { output, .. }) if !output.is_empty() => output.clone(),
            TaskOutcome::Failure(failure) => failure.to_string(),
        }
    }
}

impl Display for TaskOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(thiserror::Error)]
pub enum TaskFailure {
    #[error("exited with {}", display_code(.code))]
    Exit {
        code: Option<i32>,
        output: String,
    },
    #[error("failed to start: {0}")]
    Spawn(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to render command: {0}")]
    Template(String),
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}
