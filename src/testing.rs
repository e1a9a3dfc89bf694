//! Test doubles shared by the unit tests.

use std::{
    collections::HashSet,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use crate::{
    repository::{CommitRecord, GitError, HistoryOrder, RepositoryGateway},
    run::{
        execution::{CommandExecutor, PendingTask, ShellExecutor},
        scheduler::WorkUnit,
    },
};

const REMOTE_FILE: &str = ".fake-remote";
const HEAD_FILE: &str = "HEAD_COMMIT";

/// Slot index of a mirror directory (`.../repository/<n>`).
fn slot_of(path: &Path) -> usize {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.parse().ok())
        .unwrap_or(usize::MAX)
}

/// Tracks which slots have a task running.
#[derive(Debug, Default)]
pub struct Probe {
    state: Mutex<ProbeState>,
}

#[derive(Debug, Default)]
struct ProbeState {
    busy: HashSet<usize>,
    in_flight: usize,
    peak: usize,
    dispatched: Vec<usize>,
    violations: usize,
}

impl Probe {
    fn started(&self, slot: usize) {
        let mut state = self.state.lock().unwrap();
        if !state.busy.insert(slot) {
            state.violations += 1;
        }
        state.in_flight += 1;
        state.peak = state.peak.max(state.in_flight);
        state.dispatched.push(slot);
    }

    fn finished(&self, slot: usize) {
        let mut state = self.state.lock().unwrap();
        state.busy.remove(&slot);
        state.in_flight -= 1;
    }

    fn checking_out(&self, slot: usize) {
        let mut state = self.state.lock().unwrap();
        if state.busy.contains(&slot) {
            state.violations += 1;
        }
    }

    /// Highest number of tasks seen running at once
    pub fn peak(&self) -> usize {
        self.state.lock().unwrap().peak
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().unwrap().in_flight
    }

    pub fn dispatched_slots(&self) -> Vec<usize> {
        self.state.lock().unwrap().dispatched.clone()
    }

    /// Checkouts of, or dispatches to, a slot that still had a task running
    pub fn violations(&self) -> usize {
        self.state.lock().unwrap().violations
    }
}

/// Runs commands with a real shell while recording them in a [`Probe`].
pub struct ProbeExecutor {
    shell: ShellExecutor,
    probe: Arc<Probe>,
}

impl ProbeExecutor {
    pub fn new(probe: Arc<Probe>) -> Self {
        Self {
            shell: ShellExecutor::new(),
            probe,
        }
    }
}

impl CommandExecutor for ProbeExecutor {
    fn run_async(&self, command: String) -> PendingTask {
        self.shell.run_async(command)
    }

    fn run_in_directory_async(&self, dir: PathBuf, command: String) -> PendingTask {
        let slot = slot_of(&dir);
        self.probe.started(slot);
        let task = self.shell.run_in_directory_async(dir, command);
        let probe = self.probe.clone();
        Box::pin(async move {
            let outcome = task.await;
            probe.finished(slot);
            outcome
        })
    }
}

/// Gateway keeping its state in plain files, so that mirrors copied on
/// disk carry their remote along.
#[derive(Debug, Default)]
pub struct FakeGit {
    commits: Vec<(String, i64)>,
    probe: Option<Arc<Probe>>,
    state: Mutex<FakeGitState>,
}

#[derive(Debug, Default)]
struct FakeGitState {
    events: Vec<String>,
    checkouts: Vec<(usize, String)>,
    broken_commits: HashSet<String>,
    fail_clone: bool,
}

impl FakeGit {
    /// `commits` in history order
    pub fn new(commits: impl IntoIterator<Item = (&'static str, i64)>) -> Self {
        Self {
            commits: commits.into_iter().map(|(id, ts)| (id.to_string(), ts)).collect(),
            ..Default::default()
        }
    }

    pub fn with_probe(mut self, probe: Arc<Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn fail_checkout(&self, commit: &str) {
        self.state.lock().unwrap().broken_commits.insert(commit.to_string());
    }

    pub fn fail_clone(&self) {
        self.state.lock().unwrap().fail_clone = true;
    }

    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn clones(&self) -> usize {
        self.events().iter().filter(|e| e.starts_with("clone ")).count()
    }

    pub fn checkouts(&self) -> Vec<(usize, String)> {
        self.state.lock().unwrap().checkouts.clone()
    }

    fn error(command: String, output: impl ToString) -> GitError {
        GitError {
            command,
            output: output.to_string(),
        }
    }
}

impl RepositoryGateway for FakeGit {
    fn remote_url(&self, path: &Path) -> Result<String, GitError> {
        std::fs::read_to_string(path.join(REMOTE_FILE))
            .map(|url| url.trim().to_string())
            .map_err(|e| Self::error(format!("remote_url {}", path.display()), e))
    }

    fn clone_repository(&self, url: &str, path: &Path) -> Result<(), GitError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(format!("clone {url}"));
        let command = format!("clone {url} {}", path.display());
        if state.fail_clone {
            return Err(Self::error(command, "remote unreachable"));
        }
        std::fs::create_dir_all(path).map_err(|e| Self::error(command.clone(), e))?;
        std::fs::write(path.join(REMOTE_FILE), url).map_err(|e| Self::error(command, e))
    }

    fn commit_list(&self, _path: &Path, _branch: &str, order: HistoryOrder) -> Result<Vec<String>, GitError> {
        let mut ids = self.commits.iter().map(|(id, _)| id.clone()).collect::<Vec<_>>();
        if order == HistoryOrder::OldestFirst {
            ids.reverse();
        }
        Ok(ids)
    }

    fn checkout(&self, path: &Path, commit: &str) -> Result<(), GitError> {
        let slot = slot_of(path);
        if let Some(probe) = &self.probe {
            probe.checking_out(slot);
        }
        let mut state = self.state.lock().unwrap();
        state.events.push(format!("checkout {slot} {commit}"));
        let command = format!("checkout {commit}");
        if state.broken_commits.contains(commit) || !self.commits.iter().any(|(id, _)| id == commit) {
            return Err(Self::error(command, format!("reference is not a tree: {commit}")));
        }
        state.checkouts.push((slot, commit.to_string()));
        std::fs::write(path.join(HEAD_FILE), commit).map_err(|e| Self::error(command, e))
    }

    fn commit_timestamp(&self, _path: &Path, commit: &str) -> Result<i64, GitError> {
        self.commits
            .iter()
            .find(|(id, _)| id == commit)
            .map(|(_, ts)| *ts)
            .ok_or_else(|| Self::error(format!("show {commit}"), "unknown revision"))
    }
}

/// In-memory output sink that can be inspected while a reporter owns a clone.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub fn work_unit(task_id: &str, commit: CommitRecord, slot: usize) -> WorkUnit {
    WorkUnit {
        commit,
        task_id: task_id.to_string(),
        command: "true".to_string(),
        slot,
        dir: PathBuf::from(format!("repository/{slot}")),
    }
}
