use std::{io, path::{Path, PathBuf}, sync::Arc};

use crate::{
    repository::{GitError, LocalFilesystem, RepositoryGateway, fs::Filesystem},
    run::reporter::Reporter,
};

/// One working copy of the repository, usable as an execution slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mirror {
    pub index: usize,
    pub path: PathBuf,
    /// Commit checked out by this run, if any
    head: Option<String>,
}

/// The set of working copies living under `<root>/0`, `<root>/1`, ...
///
/// Slot 0 is cloned from the remote, the others are plain filesystem
/// copies of slot 0 so each of them can be checked out independently.
#[derive(Debug)]
pub struct MirrorPool<G: RepositoryGateway, F: Filesystem = LocalFilesystem> {
    root: PathBuf,
    git: Arc<G>,
    fs: F,
    mirrors: Vec<Mirror>,
}

impl<G: RepositoryGateway, F: Filesystem> MirrorPool<G, F> {
    pub fn new(root: impl Into<PathBuf>, git: Arc<G>, fs: F) -> Self {
        Self {
            root: root.into(),
            git,
            fs,
            mirrors: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn git(&self) -> &Arc<G> {
        &self.git
    }

    fn slot_dir(&self, slot: usize) -> PathBuf {
        self.root.join(slot.to_string())
    }

    /// Makes sure `slot_count` mirrors exist and all of them track `remote_url`.
    ///
    /// Mirrors that already track `remote_url` are left untouched, so calling
    /// this again with the same URL does nothing.
    pub fn ensure(&mut self, remote_url: &str, slot_count: usize, reporter: &dyn Reporter) -> Result<(), MirrorSetupError> {
        if slot_count == 0 {
            return Err(MirrorSetupError::NoSlots);
        }

        if !self.root.is_dir() {
            self.fs
                .mkdir(&self.root)
                .map_err(|e| MirrorSetupError::CreateDir(self.root.clone(), e))?;
        }

        let primary = self.slot_dir(0);
        if primary.is_dir() && !self.tracks(&primary, remote_url) {
            reporter.info(&format!("Existing directory \"{}\" found, removing it", primary.display()));
            self.remove(&primary)?;
        }
        if !primary.is_dir() {
            reporter.info(&format!("Cloning {remote_url} in directory \"{}\"", primary.display()));
            self.git
                .clone_repository(remote_url, &primary)
                .map_err(|source| MirrorSetupError::Clone {
                    url: remote_url.to_string(),
                    path: primary.clone(),
                    source,
                })?;
        }

        for slot in 1..slot_count {
            let dir = self.slot_dir(slot);
            if dir.is_dir() {
                if self.tracks(&dir, remote_url) {
                    log::debug!("mirror {} is up to date", dir.display());
                    continue;
                }
                reporter.info(&format!("Existing directory \"{}\" found, removing it", dir.display()));
                self.remove(&dir)?;
            }
            reporter.info(&format!("Mirroring \"{}\" to \"{}\"", primary.display(), dir.display()));
            self.fs
                .mirror(&primary, &dir)
                .map_err(|source| MirrorSetupError::Copy {
                    from: primary.clone(),
                    to: dir.clone(),
                    source,
                })?;
        }

        self.mirrors = (0..slot_count)
            .map(|index| Mirror {
                index,
                path: self.slot_dir(index),
                head: None,
            })
            .collect();
        log::info!("{} mirror(s) ready in {}", slot_count, self.root.display());
        Ok(())
    }

    fn tracks(&self, dir: &Path, remote_url: &str) -> bool {
        match self.git.remote_url(dir) {
            Ok(url) => url == remote_url,
            Err(e) => {
                log::warn!("cannot read the remote of {}: {e}", dir.display());
                false
            }
        }
    }

    fn remove(&self, dir: &Path) -> Result<(), MirrorSetupError> {
        self.fs
            .remove(dir)
            .map_err(|e| MirrorSetupError::Remove(dir.to_path_buf(), e))
    }

    /// Checks `commit` out in place. Must not be called while a task is
    /// still running in `slot`.
    pub fn checkout(&mut self, slot: usize, commit: &str) -> Result<(), CheckoutError> {
        let path = self.checkout_path(slot, commit)?;
        let result = self.git.checkout(&path, commit);
        self.record_checkout(slot, commit, result)
    }

    /// Same as [`checkout`](Self::checkout), with git running on the blocking
    /// thread pool so other tasks of the runtime keep making progress.
    pub async fn checkout_async(&mut self, slot: usize, commit: &str) -> Result<(), CheckoutError>
    where
        G: 'static,
    {
        let path = self.checkout_path(slot, commit)?;
        let git = self.git.clone();
        let id = commit.to_string();
        let result = tokio::task::spawn_blocking(move || git.checkout(&path, &id))
            .await
            .unwrap_or_else(|e| {
                Err(GitError {
                    command: format!("git checkout {commit}"),
                    output: e.to_string(),
                })
            });
        self.record_checkout(slot, commit, result)
    }

    fn checkout_path(&self, slot: usize, commit: &str) -> Result<PathBuf, CheckoutError> {
        let mirror = self.mirrors.get(slot).ok_or(CheckoutError::NoSuchSlot(slot))?;
        log::debug!("checkout {commit} in slot {slot}");
        Ok(mirror.path.clone())
    }

    fn record_checkout(&mut self, slot: usize, commit: &str, result: Result<(), GitError>) -> Result<(), CheckoutError> {
        result.map_err(|source| CheckoutError::Git {
            slot,
            commit: commit.to_string(),
            source,
        })?;
        if let Some(mirror) = self.mirrors.get_mut(slot) {
            mirror.head = Some(commit.to_string());
        }
        Ok(())
    }

    pub fn head(&self, slot: usize) -> Option<&str> {
        self.mirrors.get(slot)?.head.as_deref()
    }

    pub fn remote_url(&self, slot: usize) -> Result<String, GitError> {
        self.git.remote_url(&self.slot_dir(slot))
    }

    pub fn path(&self, slot: usize) -> Option<&Path> {
        self.mirrors.get(slot).map(|m| m.path.as_path())
    }

    pub fn mirrors(&self) -> &[Mirror] {
        &self.mirrors
    }

    pub fn len(&self) -> usize {
        self.mirrors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mirrors.is_empty()
    }

    /// The cloned working copy, used to walk the history
    pub fn primary(&self) -> PathBuf {
        self.slot_dir(0)
    }
}

#[derive(Debug)]
#[derive(thiserror::Error)]
pub enum MirrorSetupError {
    #[error("At least one mirror is required")]
    NoSlots,
    #[error("Failed to create directory \"{}\": {}", .0.display(), .1)]
    CreateDir(PathBuf, #[source] io::Error),
    #[error("Failed to remove \"{}\": {}", .0.display(), .1)]
    Remove(PathBuf, #[source] io::Error),
    #[error("Failed to clone {url} into \"{}\": {source}", .path.display())]
    Clone {
        url: String,
        path: PathBuf,
        source: GitError,
    },
    #[error("Failed to copy \"{}\" to \"{}\": {source}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
}

#[derive(Debug)]
#[derive(thiserror::Error)]
pub enum CheckoutError {
    #[error("No mirror in slot {0}")]
    NoSuchSlot(usize),
    #[error("Failed to check out {commit} in slot {slot}: {source}")]
    Git {
        slot: usize,
        commit: String,
        source: GitError,
    },
}
