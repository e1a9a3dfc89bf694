use std::{path::PathBuf, sync::Arc};

use handlebars::Handlebars;
use tokio::task::JoinSet;

use crate::{
    command::{shell_handlebars, CommandContext},
    config::TaskSpec,
    repository::{fs::Filesystem, CommitRecord, GitError, MirrorPool, RepositoryGateway},
    run::{
        execution::{CommandExecutor, PendingTask, TaskFailure, TaskOutcome},
        reporter::Reporter,
        RunError,
    },
};

/// One task to run against one commit, in one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub commit: CommitRecord,
    pub task_id: String,
    /// Rendered shell command
    pub command: String,
    pub slot: usize,
    pub dir: PathBuf,
}

/// Units dispatched since the last barrier. Each one reports itself as soon
/// as its process exits; [`Batch::join`] waits for all of them.
#[derive(Default)]
pub struct Batch {
    running: JoinSet<bool>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    fn dispatch(&mut self, unit: WorkUnit, task: PendingTask, reporter: Arc<dyn Reporter>) {
        self.running.spawn(async move {
            let outcome = task.await;
            if let TaskOutcome::Failure(failure) = &outcome {
                log::warn!("task {} failed on {}: {failure}", unit.task_id, unit.commit.id);
            }
            reporter.report(&unit, &outcome);
            outcome.is_success()
        });
    }

    /// Waits until every unit of the batch has completed, returning how many
    /// of them failed.
    async fn join(&mut self) -> usize {
        let mut failed = 0;
        while let Some(result) = self.running.join_next().await {
            match result {
                Ok(true) => {}
                Ok(false) => failed += 1,
                Err(e) => {
                    log::error!("completion task panicked: {e}");
                    failed += 1;
                }
            }
        }
        failed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub commits: usize,
    pub dispatched: usize,
    pub failed: usize,
    /// Barriers that actually waited on a non-empty batch
    pub joins: usize,
    pub interrupted: bool,
}

/// Dispatches every (commit, task) pair over the mirrors of a pool.
///
/// Slot `i` receives the `i`-th dispatch of a batch, and a batch is joined
/// every `threads` dispatches. A slot therefore never hosts two units of the
/// same batch, and is only checked out again after the barrier.
pub struct BatchScheduler<'p, G: RepositoryGateway, F: Filesystem, E: CommandExecutor> {
    pool: &'p mut MirrorPool<G, F>,
    executor: Arc<E>,
    reporter: Arc<dyn Reporter>,
    handlebars: Handlebars<'static>,
    threads: usize,
    /// Dispatches in the current batch, i.e. the next slot
    counter: usize,
    batch: Batch,
    summary: RunSummary,
}

impl<'p, G, F, E> BatchScheduler<'p, G, F, E>
where
    G: RepositoryGateway + 'static,
    F: Filesystem,
    E: CommandExecutor,
{
    /// Uses every mirror of `pool` as a slot.
    pub fn new(pool: &'p mut MirrorPool<G, F>, executor: Arc<E>, reporter: Arc<dyn Reporter>) -> Self {
        let threads = pool.len();
        Self {
            pool,
            executor,
            reporter,
            handlebars: shell_handlebars(),
            threads,
            counter: 0,
            batch: Batch::default(),
            summary: RunSummary::default(),
        }
    }

    pub async fn run(
        mut self,
        feed: impl IntoIterator<Item = Result<CommitRecord, GitError>>,
        tasks: &TaskSpec,
        run_while: impl Fn() -> bool,
    ) -> Result<RunSummary, RunError> {
        if self.threads == 0 {
            return Err(RunError::NoMirrors);
        }

        for record in feed {
            if !run_while() {
                log::info!("interrupted, no further commits will be dispatched");
                self.summary.interrupted = true;
                break;
            }
            let record = match record {
                Ok(record) => record,
                Err(e) => return self.abort(RunError::History(e)).await,
            };
            self.summary.commits += 1;

            for (task_id, template) in tasks.iter() {
                let slot = self.counter;
                if self.pool.head(slot) != Some(record.id.as_str()) {
                    if let Err(e) = self.pool.checkout_async(slot, &record.id).await {
                        return self.abort(e.into()).await;
                    }
                }

                let Some(dir) = self.pool.path(slot).map(|p| p.to_path_buf()) else {
                    return self.abort(RunError::NoMirrors).await;
                };
                let context = CommandContext {
                    task: task_id,
                    commit: &record.id,
                    short_commit: record.short_id(),
                    timestamp: record.timestamp,
                    slot,
                };
                let rendered = template.render(&self.handlebars, &context);
                let unit = WorkUnit {
                    commit: record.clone(),
                    task_id: task_id.clone(),
                    command: rendered.as_ref().cloned().unwrap_or_else(|_| template.source().to_string()),
                    slot,
                    dir: dir.clone(),
                };
                let task: PendingTask = match rendered {
                    Ok(command) => self.executor.run_in_directory_async(dir, command),
                    Err(e) => {
                        let failure = TaskFailure::Template(e.to_string());
                        Box::pin(async move { TaskOutcome::Failure(failure) })
                    }
                };

                log::debug!("dispatch {} on {} in slot {slot}", unit.task_id, unit.commit.short_id());
                self.batch.dispatch(unit, task, self.reporter.clone());
                self.summary.dispatched += 1;
                self.counter += 1;

                if self.counter == self.threads {
                    self.join().await;
                }
            }
        }

        self.join().await;
        Ok(self.summary)
    }

    async fn join(&mut self) {
        if !self.batch.is_empty() {
            log::debug!("joining {} task(s)", self.batch.len());
            self.summary.failed += self.batch.join().await;
            self.summary.joins += 1;
        }
        self.counter = 0;
    }

    /// Lets the units already started finish, then fails with `error`.
    async fn abort(mut self, error: RunError) -> Result<RunSummary, RunError> {
        self.join().await;
        Err(error)
    }
}
