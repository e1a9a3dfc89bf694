use std::{path::PathBuf, sync::Arc, time::Duration};

use crate::{
    config::{ConfigError, ConfigSource},
    repository::{
        CheckoutError, CommitFeed, GitCli, GitError, HistoryOrder, LocalFilesystem, MirrorPool, MirrorSetupError,
        RepositoryGateway, fs::Filesystem,
    },
    run::{
        execution::{CommandExecutor, ShellExecutor},
        reporter::Reporter,
    },
};

pub mod execution;
pub mod reporter;
pub mod scheduler;

pub use scheduler::{BatchScheduler, RunSummary, WorkUnit};

pub const DEFAULT_REPOSITORY_DIR: &str = "repository";

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Directory holding the mirrors
    pub repository_dir: PathBuf,
    /// Number of mirrors, and of tasks running at the same time
    pub threads: usize,
    pub timeout: Option<Duration>,
    pub order: HistoryOrder,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            repository_dir: PathBuf::from(DEFAULT_REPOSITORY_DIR),
            threads: 1,
            timeout: None,
            order: HistoryOrder::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error(transparent)]
    MirrorSetup(#[from] MirrorSetupError),
    #[error(transparent)]
    Checkout(#[from] CheckoutError),
    #[error("Failed to read the commit history: {0}")]
    History(#[source] GitError),
    #[error("No mirror available")]
    NoMirrors,
}

/// Runs every configured task against every commit, using `git` and the
/// local filesystem.
pub async fn run(
    config: &dyn ConfigSource,
    options: &RunOptions,
    reporter: Arc<dyn Reporter>,
    run_while: impl Fn() -> bool,
) -> Result<RunSummary, RunError> {
    run_with(
        config,
        options,
        Arc::new(GitCli::new()),
        LocalFilesystem,
        Arc::new(ShellExecutor::with_timeout(options.timeout)),
        reporter,
        run_while,
    )
    .await
}

/// Same as [`run`], with every collaborator supplied by the caller.
pub async fn run_with<G, F, E>(
    config: &dyn ConfigSource,
    options: &RunOptions,
    git: Arc<G>,
    fs: F,
    executor: Arc<E>,
    reporter: Arc<dyn Reporter>,
    run_while: impl Fn() -> bool,
) -> Result<RunSummary, RunError>
where
    G: RepositoryGateway + 'static,
    F: Filesystem,
    E: CommandExecutor,
{
    // nothing touches the disk before the configuration is known to be valid
    let config = config.load()?;

    let mut pool = MirrorPool::new(&options.repository_dir, git.clone(), fs);
    pool.ensure(&config.repository, options.threads, reporter.as_ref())?;

    let feed = CommitFeed::new(git, pool.primary(), &config.branch, options.order).map_err(RunError::History)?;
    reporter.info(&format!("Iterating through {} commits", feed.remaining()));
    reporter.begin((feed.remaining() * config.tasks.len()) as u64);

    let result = BatchScheduler::new(&mut pool, executor, reporter.clone())
        .run(feed, &config.tasks, run_while)
        .await;
    reporter.finish();

    let summary = result?;
    log::info!(
        "{} commit(s), {} task run(s), {} failed, {} barrier(s)",
        summary.commits,
        summary.dispatched,
        summary.failed,
        summary.joins,
    );
    Ok(summary)
}
