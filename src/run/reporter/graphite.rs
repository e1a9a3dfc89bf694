use std::{io::Write, sync::Mutex};

use crate::run::{execution::TaskOutcome, reporter::Reporter, scheduler::WorkUnit};

/// Machine readable output, one `<task> <outcome> <timestamp>` line per
/// completed unit, in the plaintext format accepted by Graphite.
pub struct GraphiteReporter<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> GraphiteReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }
}

/// The line for `unit`, or `None` when the outcome has no value to report.
pub fn format_line(unit: &WorkUnit, outcome: &TaskOutcome) -> Option<String> {
    let text = outcome.text();
    let value = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if value.is_empty() {
        return None;
    }
    Some(format!("{} {} {}", unit.task_id, value, unit.commit.timestamp))
}

impl<W: Write + Send> Reporter for GraphiteReporter<W> {
    fn info(&self, _message: &str) {}

    fn report(&self, unit: &WorkUnit, outcome: &TaskOutcome) {
        let Some(line) = format_line(unit, outcome) else {
            log::warn!("{} printed nothing on {}, no metric written", unit.task_id, unit.commit.id);
            return;
        };
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
            log::error!("failed to write result: {e}");
        }
    }
}
