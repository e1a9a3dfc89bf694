use crate::run::{execution::TaskOutcome, scheduler::WorkUnit};

pub mod graphite;
pub mod human;

pub use graphite::GraphiteReporter;
pub use human::HumanReporter;

/// Receives the results of a run.
///
/// `report` is called from the task that awaited the unit, possibly
/// concurrently with other units of the same batch.
pub trait Reporter: Send + Sync {
    /// Called once the number of work units is known.
    fn begin(&self, _total_units: u64) {}

    /// Progress messages, not part of the results.
    fn info(&self, message: &str);

    fn report(&self, unit: &WorkUnit, outcome: &TaskOutcome);

    fn finish(&self) {}
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn info(&self, _message: &str) {}
    fn report(&self, _unit: &WorkUnit, _outcome: &TaskOutcome) {}
}
