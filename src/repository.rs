use std::{path::{Path, PathBuf}, sync::Arc};

pub mod fs;
pub mod git;
pub mod mirror;

pub use fs::{Filesystem, LocalFilesystem};
pub use git::GitCli;
pub use mirror::{MirrorPool, MirrorSetupError, CheckoutError};

/// Order in which the history of a branch is walked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum HistoryOrder {
    /// `git log` order
    #[default]
    NewestFirst,
    OldestFirst,
}

/// The version-control operations the runner needs.
pub trait RepositoryGateway: Send + Sync {
    fn remote_url(&self, path: &Path) -> Result<String, GitError>;
    fn clone_repository(&self, url: &str, path: &Path) -> Result<(), GitError>;
    fn commit_list(&self, path: &Path, branch: &str, order: HistoryOrder) -> Result<Vec<String>, GitError>;
    fn checkout(&self, path: &Path, commit: &str) -> Result<(), GitError>;
    /// Author time of `commit`, in unix seconds
    fn commit_timestamp(&self, path: &Path, commit: &str) -> Result<i64, GitError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(thiserror::Error)]
#[error("`{command}` failed: {output}")]
pub struct GitError {
    pub command: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommitRecord {
    pub id: String,
    pub timestamp: i64,
}

impl CommitRecord {
    pub fn new(id: impl Into<String>, timestamp: i64) -> Self {
        Self { id: id.into(), timestamp }
    }

    pub fn short_id(&self) -> &str {
        self.id.get(..7).unwrap_or(&self.id)
    }
}

/// Lazily yields the commits of a branch, resolving each timestamp only
/// when the commit is reached.
pub struct CommitFeed<G: RepositoryGateway> {
    git: Arc<G>,
    path: PathBuf,
    ids: std::vec::IntoIter<String>,
}

impl<G: RepositoryGateway> CommitFeed<G> {
    pub fn new(git: Arc<G>, path: impl Into<PathBuf>, branch: &str, order: HistoryOrder) -> Result<Self, GitError> {
        let path = path.into();
        let ids = git.commit_list(&path, branch, order)?;
        Ok(Self {
            git,
            path,
            ids: ids.into_iter(),
        })
    }

    /// Commits not yet yielded
    pub fn remaining(&self) -> usize {
        self.ids.len()
    }
}

impl<G: RepositoryGateway> Iterator for CommitFeed<G> {
    type Item = Result<CommitRecord, GitError>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids.next()?;
        Some(
            self.git
                .commit_timestamp(&self.path, &id)
                .map(|timestamp| CommitRecord { id, timestamp }),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}
