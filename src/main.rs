use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use git_iterate::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let args = Cli::parse();

    match git_iterate::cli::main(&args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}
