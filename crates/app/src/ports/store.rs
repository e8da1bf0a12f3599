//! Storage port — persistence for schedule and trigger records.

use std::future::Future;

use cadence_domain::error::CadenceError;
use cadence_domain::id::ScheduleId;
use cadence_domain::schedule::{ExecutionState, ScheduleEntry};
use cadence_domain::time::Timestamp;
use cadence_domain::trigger::{TriggerEntry, TriggerType};

/// Repository for persisting and querying schedules and their triggers.
///
/// Every call is atomic from the orchestrator's point of view: once a save
/// resolves, the store is the system of record for that mutation. The
/// orchestrator is the only caller, so implementations never see concurrent
/// mutations of the same entry.
pub trait ScheduleStore: Send + Sync + 'static {
    /// Insert or overwrite schedule entries (triggers included).
    fn save_entries(
        &self,
        entries: &[ScheduleEntry],
    ) -> impl Future<Output = Result<(), CadenceError>> + Send;

    /// Overwrite the progress of the given trigger records in place.
    fn save_triggers(
        &self,
        triggers: &[TriggerEntry],
    ) -> impl Future<Output = Result<(), CadenceError>> + Send;

    /// Get a schedule entry by id.
    fn get(
        &self,
        id: ScheduleId,
    ) -> impl Future<Output = Result<Option<ScheduleEntry>, CadenceError>> + Send;

    /// Get the schedule entries for a set of ids. Missing ids are skipped.
    fn get_many(
        &self,
        ids: &[ScheduleId],
    ) -> impl Future<Output = Result<Vec<ScheduleEntry>, CadenceError>> + Send;

    /// Get all schedule entries.
    fn get_all(&self) -> impl Future<Output = Result<Vec<ScheduleEntry>, CadenceError>> + Send;

    /// Get all entries whose execution state is one of `states`.
    fn get_by_state(
        &self,
        states: &[ExecutionState],
    ) -> impl Future<Output = Result<Vec<ScheduleEntry>, CadenceError>> + Send;

    /// Get all entries in a group.
    fn get_by_group(
        &self,
        group: &str,
    ) -> impl Future<Output = Result<Vec<ScheduleEntry>, CadenceError>> + Send;

    /// Get all non-finished entries whose end date has passed.
    fn get_active_expired(
        &self,
        now: Timestamp,
    ) -> impl Future<Output = Result<Vec<ScheduleEntry>, CadenceError>> + Send;

    /// Get the trigger records of `kind` whose schedule currently evaluates
    /// them (standard triggers on idle schedules, cancellation triggers on
    /// delayed/preparing/waiting schedules), optionally limited to one
    /// schedule.
    fn active_triggers(
        &self,
        kind: TriggerType,
        schedule_id: Option<ScheduleId>,
    ) -> impl Future<Output = Result<Vec<TriggerEntry>, CadenceError>> + Send;

    /// Delete the given schedules and their triggers. Missing ids are
    /// ignored.
    fn delete_many(
        &self,
        ids: &[ScheduleId],
    ) -> impl Future<Output = Result<(), CadenceError>> + Send;

    /// Delete an entire group; returns whether anything was deleted.
    fn delete_group(
        &self,
        group: &str,
    ) -> impl Future<Output = Result<bool, CadenceError>> + Send;

    /// Delete everything.
    fn delete_all(&self) -> impl Future<Output = Result<(), CadenceError>> + Send;

    /// Number of stored schedule entries.
    fn count(&self) -> impl Future<Output = Result<usize, CadenceError>> + Send;
}

impl<T: ScheduleStore> ScheduleStore for std::sync::Arc<T> {
    fn save_entries(
        &self,
        entries: &[ScheduleEntry],
    ) -> impl Future<Output = Result<(), CadenceError>> + Send {
        (**self).save_entries(entries)
    }

    fn save_triggers(
        &self,
        triggers: &[TriggerEntry],
    ) -> impl Future<Output = Result<(), CadenceError>> + Send {
        (**self).save_triggers(triggers)
    }

    fn get(
        &self,
        id: ScheduleId,
    ) -> impl Future<Output = Result<Option<ScheduleEntry>, CadenceError>> + Send {
        (**self).get(id)
    }

    fn get_many(
        &self,
        ids: &[ScheduleId],
    ) -> impl Future<Output = Result<Vec<ScheduleEntry>, CadenceError>> + Send {
        (**self).get_many(ids)
    }

    fn get_all(&self) -> impl Future<Output = Result<Vec<ScheduleEntry>, CadenceError>> + Send {
        (**self).get_all()
    }

    fn get_by_state(
        &self,
        states: &[ExecutionState],
    ) -> impl Future<Output = Result<Vec<ScheduleEntry>, CadenceError>> + Send {
        (**self).get_by_state(states)
    }

    fn get_by_group(
        &self,
        group: &str,
    ) -> impl Future<Output = Result<Vec<ScheduleEntry>, CadenceError>> + Send {
        (**self).get_by_group(group)
    }

    fn get_active_expired(
        &self,
        now: Timestamp,
    ) -> impl Future<Output = Result<Vec<ScheduleEntry>, CadenceError>> + Send {
        (**self).get_active_expired(now)
    }

    fn active_triggers(
        &self,
        kind: TriggerType,
        schedule_id: Option<ScheduleId>,
    ) -> impl Future<Output = Result<Vec<TriggerEntry>, CadenceError>> + Send {
        (**self).active_triggers(kind, schedule_id)
    }

    fn delete_many(
        &self,
        ids: &[ScheduleId],
    ) -> impl Future<Output = Result<(), CadenceError>> + Send {
        (**self).delete_many(ids)
    }

    fn delete_group(
        &self,
        group: &str,
    ) -> impl Future<Output = Result<bool, CadenceError>> + Send {
        (**self).delete_group(group)
    }

    fn delete_all(&self) -> impl Future<Output = Result<(), CadenceError>> + Send {
        (**self).delete_all()
    }

    fn count(&self) -> impl Future<Output = Result<usize, CadenceError>> + Send {
        (**self).count()
    }
}
