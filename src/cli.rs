use std::{
    path::PathBuf,
    process::ExitCode,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use clap::Parser;

use crate::{
    cli::threads_config::ThreadsConfig,
    config::{YamlConfigSource, DEFAULT_CONFIG_FILE},
    repository::HistoryOrder,
    run::{
        reporter::{GraphiteReporter, HumanReporter, Reporter},
        RunOptions, DEFAULT_REPOSITORY_DIR,
    },
};

pub mod threads_config;

/// Exit status of a run stopped with Ctrl+C
pub const INTERRUPTED: u8 = 130;

/// Runs a set of tasks against every commit of a git repository.
///
/// Tasks and the repository are read from a YAML configuration file:
///
///     repository: https://github.com/user/project.git
///     tasks:
///       lines: find src -type f | xargs cat | wc -l
///
/// Each task output is printed along with the commit it ran on, so its
/// evolution through the history can be followed or plotted.
#[derive(Parser, Debug)]
#[clap(styles = cli_styles::CLAP_STYLES, verbatim_doc_comment, version)]
pub struct Cli {
    /// Print `<task> <result> <timestamp>` lines only, for Graphite
    #[clap(long)]
    pub graphite: bool,

    /// Number of mirrors, i.e. of tasks running at the same time
    #[clap(short, long, default_value = "1")]
    pub threads: ThreadsConfig,

    /// Configuration file
    #[clap(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Directory where the mirrors are kept between runs
    #[clap(long, default_value = DEFAULT_REPOSITORY_DIR)]
    pub repository_dir: PathBuf,

    /// Kill tasks running longer than this many seconds
    #[clap(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Walk the history from the first commit instead of the last one
    #[clap(long)]
    pub oldest_first: bool,
}

impl Cli {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            repository_dir: self.repository_dir.clone(),
            threads: self.threads.get_num_threads(),
            timeout: self.timeout.map(Duration::from_secs),
            order: if self.oldest_first { HistoryOrder::OldestFirst } else { HistoryOrder::NewestFirst },
        }
    }

    fn reporter(&self) -> Arc<dyn Reporter> {
        if self.graphite {
            Arc::new(GraphiteReporter::new(std::io::stdout()))
        } else {
            Arc::new(HumanReporter::new(std::io::stdout()))
        }
    }
}

pub async fn main(args: &Cli) -> anyhow::Result<ExitCode> {
    let keep_going = Arc::new(AtomicBool::new(true));
    {
        let keep_going = keep_going.clone();
        ctrlc::set_handler(move || {
            if keep_going.swap(false, Ordering::SeqCst) {
                eprintln!("\nInterrupted, waiting for the running tasks...");
            } else {
                std::process::exit(INTERRUPTED.into());
            }
        })?;
    }

    let config = YamlConfigSource::new(&args.config);
    let options = args.run_options();
    log::debug!("{options:?}");

    let summary = crate::run::run(&config, &options, args.reporter(), || keep_going.load(Ordering::SeqCst)).await?;

    if summary.interrupted {
        return Ok(ExitCode::from(INTERRUPTED));
    }
    Ok(ExitCode::SUCCESS)
}
