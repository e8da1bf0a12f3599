//! Driver port — the integration point that prepares and executes payloads.

use std::future::Future;

use cadence_domain::error::CadenceError;
use cadence_domain::schedule::ScheduleEntry;

/// Outcome of preparing a schedule's payload for execution.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PrepareResult {
    /// Abandon this schedule entirely and delete it.
    Cancel,
    /// Payload is ready, move on to condition checks and execution.
    Continue,
    /// Skip this occurrence without counting it against the limit.
    Skip,
    /// Skip this occurrence but count it as an execution.
    Penalize,
}

/// The consumer side of the engine: turns stored schedule data into an
/// executable payload and runs it.
///
/// `prepare` may take arbitrarily long (asset downloads, audience checks);
/// the engine keeps the schedule in its preparing state until the result
/// arrives. `is_ready_to_execute` must be cheap, it is polled every time
/// conditions change.
pub trait Driver: Send + Sync + 'static {
    /// Prepared payload, handed back to the driver at execution time.
    type Schedule: Clone + Send + Sync + 'static;

    /// Decode the stored payload into a typed schedule.
    ///
    /// # Errors
    ///
    /// Should fail when the stored data cannot be interpreted, for example
    /// after a downgrade to a version that no longer understands it. The
    /// engine deletes the schedule in that case.
    fn build(&self, entry: &ScheduleEntry) -> Result<Self::Schedule, CadenceError>;

    /// Prepare the payload for display.
    fn prepare(
        &self,
        entry: &ScheduleEntry,
        schedule: Self::Schedule,
    ) -> impl Future<Output = PrepareResult> + Send;

    /// Whether display conditions are currently met.
    fn is_ready_to_execute(&self, schedule: &Self::Schedule) -> bool;

    /// Execute the payload. The returned future resolves when the
    /// execution has finished (for example the message was dismissed).
    fn execute(
        &self,
        entry: &ScheduleEntry,
        schedule: Self::Schedule,
    ) -> impl Future<Output = ()> + Send;
}

impl<T: Driver> Driver for std::sync::Arc<T> {
    type Schedule = T::Schedule;

    fn build(&self, entry: &ScheduleEntry) -> Result<Self::Schedule, CadenceError> {
        (**self).build(entry)
    }

    fn prepare(
        &self,
        entry: &ScheduleEntry,
        schedule: Self::Schedule,
    ) -> impl Future<Output = PrepareResult> + Send {
        (**self).prepare(entry, schedule)
    }

    fn is_ready_to_execute(&self, schedule: &Self::Schedule) -> bool {
        (**self).is_ready_to_execute(schedule)
    }

    fn execute(
        &self,
        entry: &ScheduleEntry,
        schedule: Self::Schedule,
    ) -> impl Future<Output = ()> + Send {
        (**self).execute(entry, schedule)
    }
}
