use std::{io::Write, sync::Mutex};

use chrono::DateTime;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::run::{execution::TaskOutcome, reporter::Reporter, scheduler::WorkUnit};

/// Colored console output with a progress bar.
pub struct HumanReporter<W: Write + Send> {
    out: Mutex<W>,
    bar: ProgressBar,
}

impl<W: Write + Send> HumanReporter<W> {
    pub fn new(out: W) -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template("[{elapsed_precise}] [{bar:40.green/white}] {pos:>7}/{len:7} {msg}") {
            bar.set_style(style.progress_chars("=>-"));
        }
        Self::with_bar(out, bar)
    }

    /// Reporter without a progress bar, for non interactive output.
    pub fn plain(out: W) -> Self {
        Self::with_bar(out, ProgressBar::hidden())
    }

    fn with_bar(out: W, bar: ProgressBar) -> Self {
        Self {
            out: Mutex::new(out),
            bar,
        }
    }

    fn write_line(&self, line: &str) {
        self.bar.suspend(|| {
            let Ok(mut out) = self.out.lock() else {
                return;
            };
            if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
                log::error!("failed to write output: {e}");
            }
        });
    }
}

/// Day, abbreviated month and year of a unix timestamp, e.g. `3 Mar 2017`.
pub fn format_date(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|date| date.format("%-d %b %Y").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

pub fn format_line(unit: &WorkUnit, outcome: &TaskOutcome) -> String {
    let header = format!("{}:", unit.task_id);
    let text = outcome.text();
    let (header, text) = if outcome.is_success() {
        (header.green().bold(), text.green())
    } else {
        (header.red().bold(), text.red())
    };
    format!(
        "{header} {text} on commit {} ({})",
        unit.commit.short_id().cyan(),
        format_date(unit.commit.timestamp),
    )
}

impl<W: Write + Send> Reporter for HumanReporter<W> {
    fn begin(&self, total_units: u64) {
        self.bar.set_length(total_units);
    }

    fn info(&self, message: &str) {
        self.write_line(&message.yellow().to_string());
    }

    fn report(&self, unit: &WorkUnit, outcome: &TaskOutcome) {
        self.bar.inc(1);
        self.bar.set_message(format!("commit {}", unit.commit.short_id()));
        self.write_line(&format_line(unit, outcome));
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{repository::CommitRecord, run::execution::TaskFailure, testing::{work_unit, SharedBuffer}};

    #[test]
    fn dates() {
        assert_eq!(format_date(0), "1 Jan 1970");
        assert_eq!(format_date(1_488_499_200), "3 Mar 2017");
    }

    #[test]
    fn lines_name_task_outcome_commit_and_date() {
        colored::control::set_override(false);
        let buffer = SharedBuffer::default();
        let reporter = HumanReporter::plain(buffer.clone());
        let unit = work_unit("phpcs", CommitRecord::new("0123456789abcdef", 1_488_499_200), 0);

        reporter.info("Iterating through 1 commits");
        reporter.report(&unit, &TaskOutcome::Success("ok".into()));
        reporter.report(&unit, &TaskOutcome::Failure(TaskFailure::Exit { code: Some(1), output: "FAIL".into() }));
        reporter.finish();

        assert_eq!(
            buffer.contents(),
            "Iterating through 1 commits\n\
             phpcs: ok on commit 0123456 (3 Mar 2017)\n\
             phpcs: FAIL on commit 0123456 (3 Mar 2017)\n"
        );
    }
}
