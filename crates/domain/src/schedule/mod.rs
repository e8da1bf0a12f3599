//! Schedules — automation rules with triggers, limits, and timing.
//!
//! A [`ScheduleInfo`] describes what a caller wants: which triggers arm it,
//! how often it may run, and the delay/interval/grace timing around runs.
//! The engine assigns it an identity and tracks it as a [`ScheduleEntry`],
//! the persistent record the state machine operates on.

mod edits;
mod state;

pub use edits::ScheduleEdits;
pub use state::ExecutionState;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, ValidationError};
use crate::id::ScheduleId;
use crate::time::Timestamp;
use crate::trigger::{TriggerEntry, TriggerSpec};

/// App-state constraint a schedule must satisfy before executing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    /// Execute regardless of foreground state.
    #[default]
    Any,
    /// Execute only while the app is foregrounded.
    Foreground,
    /// Execute only while the app is backgrounded.
    Background,
}

/// A schedule request — everything but the identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleInfo {
    pub group: Option<String>,
    /// Lower values run first when several schedules compete.
    pub priority: i32,
    /// Execution limit; zero means unlimited.
    pub limit: u32,
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
    /// Delay between trigger and preparation.
    pub delay: Duration,
    /// Cooldown after each execution.
    pub interval: Duration,
    /// How long a finished schedule stays editable before deletion.
    /// `None` deletes it the moment it finishes.
    pub edit_grace_period: Option<Duration>,
    pub app_state: AppState,
    /// Screens the app must be on to execute; empty means any.
    pub screens: Vec<String>,
    /// Region the device must be in to execute.
    pub region_id: Option<String>,
    /// Opaque payload the driver materializes into an executable schedule.
    pub data: serde_json::Value,
    pub triggers: Vec<TriggerSpec>,
}

impl ScheduleInfo {
    /// Create a builder for constructing a [`ScheduleInfo`].
    #[must_use]
    pub fn builder() -> ScheduleInfoBuilder {
        ScheduleInfoBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::Validation`] when:
    /// - `triggers` is empty ([`ValidationError::NoTriggers`])
    /// - a trigger goal is not strictly positive
    ///   ([`ValidationError::NonPositiveGoal`])
    /// - `end` precedes `start` ([`ValidationError::EndBeforeStart`])
    pub fn validate(&self) -> Result<(), CadenceError> {
        if self.triggers.is_empty() {
            return Err(ValidationError::NoTriggers.into());
        }
        for trigger in &self.triggers {
            if trigger.goal <= 0.0 {
                return Err(ValidationError::NonPositiveGoal.into());
            }
        }
        if let (Some(start), Some(end)) = (self.start, self.end)
            && end < start
        {
            return Err(ValidationError::EndBeforeStart.into());
        }
        Ok(())
    }
}

/// Step-by-step builder for [`ScheduleInfo`].
#[derive(Debug, Default)]
pub struct ScheduleInfoBuilder {
    group: Option<String>,
    priority: i32,
    limit: Option<u32>,
    start: Option<Timestamp>,
    end: Option<Timestamp>,
    delay: Duration,
    interval: Duration,
    edit_grace_period: Option<Duration>,
    app_state: AppState,
    screens: Vec<String>,
    region_id: Option<String>,
    data: Option<serde_json::Value>,
    triggers: Vec<TriggerSpec>,
}

impl ScheduleInfoBuilder {
    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn start(mut self, start: Timestamp) -> Self {
        self.start = Some(start);
        self
    }

    #[must_use]
    pub fn end(mut self, end: Timestamp) -> Self {
        self.end = Some(end);
        self
    }

    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn edit_grace_period(mut self, grace: Duration) -> Self {
        self.edit_grace_period = Some(grace);
        self
    }

    #[must_use]
    pub fn app_state(mut self, app_state: AppState) -> Self {
        self.app_state = app_state;
        self
    }

    #[must_use]
    pub fn screen(mut self, screen: impl Into<String>) -> Self {
        self.screens.push(screen.into());
        self
    }

    #[must_use]
    pub fn region_id(mut self, region_id: impl Into<String>) -> Self {
        self.region_id = Some(region_id.into());
        self
    }

    #[must_use]
    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn trigger(mut self, trigger: TriggerSpec) -> Self {
        self.triggers.push(trigger);
        self
    }

    /// Consume the builder, validate, and return a [`ScheduleInfo`].
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::Validation`] if invariants fail; see
    /// [`ScheduleInfo::validate`].
    pub fn build(self) -> Result<ScheduleInfo, CadenceError> {
        let info = ScheduleInfo {
            group: self.group,
            priority: self.priority,
            limit: self.limit.unwrap_or(1),
            start: self.start,
            end: self.end,
            delay: self.delay,
            interval: self.interval,
            edit_grace_period: self.edit_grace_period,
            app_state: self.app_state,
            screens: self.screens,
            region_id: self.region_id,
            data: self.data.unwrap_or(serde_json::Value::Null),
            triggers: self.triggers,
        };
        info.validate()?;
        Ok(info)
    }
}

/// One persistent automation rule instance.
///
/// Mutated exclusively on the orchestrator's serial queue; the persistent
/// store is authoritative after every save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: ScheduleId,
    pub group: Option<String>,
    pub priority: i32,
    /// Execution limit; zero means unlimited.
    pub limit: u32,
    /// Completed execution count.
    pub count: u32,
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
    pub delay: Duration,
    pub interval: Duration,
    pub edit_grace_period: Option<Duration>,
    pub app_state: AppState,
    pub screens: Vec<String>,
    pub region_id: Option<String>,
    pub data: serde_json::Value,
    pub triggers: Vec<TriggerEntry>,
    state: ExecutionState,
    state_changed_at: Timestamp,
    /// When the pending delay elapses; meaningful only in
    /// [`ExecutionState::TimeDelayed`].
    pub delay_finished_at: Option<Timestamp>,
}

impl ScheduleEntry {
    /// Materialize a request into a persistent entry.
    #[must_use]
    pub fn new(id: ScheduleId, info: ScheduleInfo, now: Timestamp) -> Self {
        let triggers = info
            .triggers
            .into_iter()
            .map(|spec| spec.into_entry(id))
            .collect();

        Self {
            id,
            group: info.group,
            priority: info.priority,
            limit: info.limit,
            count: 0,
            start: info.start,
            end: info.end,
            delay: info.delay,
            interval: info.interval,
            edit_grace_period: info.edit_grace_period,
            app_state: info.app_state,
            screens: info.screens,
            region_id: info.region_id,
            data: info.data,
            triggers,
            state: ExecutionState::Idle,
            state_changed_at: now,
            delay_finished_at: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn execution_state(&self) -> ExecutionState {
        self.state
    }

    /// When the state last changed.
    #[must_use]
    pub fn state_changed_at(&self) -> Timestamp {
        self.state_changed_at
    }

    /// Transition to `state`, recording the change time.
    pub fn set_execution_state(&mut self, state: ExecutionState, now: Timestamp) {
        self.state = state;
        self.state_changed_at = now;
    }

    /// Whether the schedule window has closed.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.end.is_some_and(|end| now > end)
    }

    /// Whether the execution count has reached the limit.
    /// A zero limit never exhausts.
    #[must_use]
    pub fn is_over_limit(&self) -> bool {
        self.limit > 0 && self.count >= self.limit
    }

    /// When a finished entry becomes eligible for deletion, if retained.
    /// `None` means it should not be retained at all.
    #[must_use]
    pub fn retention_deadline(&self) -> Option<Timestamp> {
        let grace = chrono::Duration::from_std(self.edit_grace_period?).ok()?;
        self.state_changed_at.checked_add_signed(grace)
    }

    /// Whether any trigger of `kind` is attached.
    #[must_use]
    pub fn has_trigger_of(&self, kind: crate::trigger::TriggerType) -> bool {
        self.triggers.iter().any(|trigger| trigger.kind == kind)
    }

    /// Reset the progress of all cancellation triggers to zero.
    pub fn reset_cancellation_triggers(&mut self) {
        for trigger in &mut self.triggers {
            if trigger.is_cancellation {
                trigger.progress = 0.0;
            }
        }
    }

    /// Apply a partial edit set. The caller decides whether the edit
    /// revives or finishes the schedule afterward.
    pub fn apply_edits(&mut self, edits: &ScheduleEdits) {
        if let Some(limit) = edits.limit {
            self.limit = limit;
        }
        if let Some(start) = edits.start {
            self.start = Some(start);
        }
        if let Some(end) = edits.end {
            self.end = Some(end);
        }
        if let Some(priority) = edits.priority {
            self.priority = priority;
        }
        if let Some(interval) = edits.interval {
            self.interval = interval;
        }
        if let Some(grace) = edits.edit_grace_period {
            self.edit_grace_period = grace;
        }
        if let Some(data) = &edits.data {
            self.data = data.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::now;
    use crate::trigger::TriggerType;

    fn valid_info() -> ScheduleInfo {
        ScheduleInfo::builder()
            .trigger(TriggerSpec::new(TriggerType::CustomEventCount, 1.0))
            .data(serde_json::json!({"message": "welcome"}))
            .build()
            .unwrap()
    }

    #[test]
    fn should_build_valid_info_with_defaults() {
        let info = valid_info();
        assert_eq!(info.limit, 1);
        assert_eq!(info.priority, 0);
        assert_eq!(info.delay, Duration::ZERO);
        assert_eq!(info.interval, Duration::ZERO);
        assert!(info.edit_grace_period.is_none());
        assert_eq!(info.app_state, AppState::Any);
    }

    #[test]
    fn should_reject_info_without_triggers() {
        let result = ScheduleInfo::builder().build();
        assert!(matches!(
            result,
            Err(CadenceError::Validation(ValidationError::NoTriggers))
        ));
    }

    #[test]
    fn should_reject_info_with_non_positive_goal() {
        let result = ScheduleInfo::builder()
            .trigger(TriggerSpec::new(TriggerType::Foreground, 0.0))
            .build();
        assert!(matches!(
            result,
            Err(CadenceError::Validation(ValidationError::NonPositiveGoal))
        ));
    }

    #[test]
    fn should_reject_info_when_end_precedes_start() {
        let ts = now();
        let result = ScheduleInfo::builder()
            .trigger(TriggerSpec::new(TriggerType::Foreground, 1.0))
            .start(ts)
            .end(ts - chrono::Duration::seconds(10))
            .build();
        assert!(matches!(
            result,
            Err(CadenceError::Validation(ValidationError::EndBeforeStart))
        ));
    }

    #[test]
    fn should_create_entry_in_idle_state_with_owned_triggers() {
        let id = ScheduleId::new();
        let entry = ScheduleEntry::new(id, valid_info(), now());

        assert_eq!(entry.execution_state(), ExecutionState::Idle);
        assert_eq!(entry.count, 0);
        assert_eq!(entry.triggers.len(), 1);
        assert_eq!(entry.triggers[0].schedule_id, id);
    }

    #[test]
    fn should_record_state_change_time_on_transition() {
        let mut entry = ScheduleEntry::new(ScheduleId::new(), valid_info(), now());
        let before = entry.state_changed_at();

        let later = before + chrono::Duration::seconds(5);
        entry.set_execution_state(ExecutionState::PreparingSchedule, later);

        assert_eq!(entry.execution_state(), ExecutionState::PreparingSchedule);
        assert_eq!(entry.state_changed_at(), later);
    }

    #[test]
    fn should_not_expire_without_end_date() {
        let entry = ScheduleEntry::new(ScheduleId::new(), valid_info(), now());
        assert!(!entry.is_expired(now() + chrono::Duration::days(365)));
    }

    #[test]
    fn should_expire_once_past_end_date() {
        let ts = now();
        let info = ScheduleInfo::builder()
            .trigger(TriggerSpec::new(TriggerType::Foreground, 1.0))
            .end(ts)
            .build()
            .unwrap();
        let entry = ScheduleEntry::new(ScheduleId::new(), info, ts);

        assert!(!entry.is_expired(ts));
        assert!(entry.is_expired(ts + chrono::Duration::milliseconds(1)));
    }

    #[test]
    fn should_be_over_limit_when_count_reaches_limit() {
        let mut entry = ScheduleEntry::new(ScheduleId::new(), valid_info(), now());
        assert!(!entry.is_over_limit());
        entry.count = 1;
        assert!(entry.is_over_limit());
    }

    #[test]
    fn should_never_be_over_limit_with_zero_limit() {
        let info = ScheduleInfo::builder()
            .trigger(TriggerSpec::new(TriggerType::Foreground, 1.0))
            .limit(0)
            .build()
            .unwrap();
        let mut entry = ScheduleEntry::new(ScheduleId::new(), info, now());
        entry.count = 1000;
        assert!(!entry.is_over_limit());
    }

    #[test]
    fn should_compute_retention_deadline_from_state_change() {
        let ts = now();
        let info = ScheduleInfo::builder()
            .trigger(TriggerSpec::new(TriggerType::Foreground, 1.0))
            .edit_grace_period(Duration::from_secs(60))
            .build()
            .unwrap();
        let mut entry = ScheduleEntry::new(ScheduleId::new(), info, ts);
        entry.set_execution_state(ExecutionState::Finished, ts);

        let deadline = entry.retention_deadline().unwrap();
        assert_eq!(deadline, ts + chrono::Duration::seconds(60));
    }

    #[test]
    fn should_have_no_retention_deadline_without_grace_period() {
        let entry = ScheduleEntry::new(ScheduleId::new(), valid_info(), now());
        assert!(entry.retention_deadline().is_none());
    }

    #[test]
    fn should_reset_only_cancellation_trigger_progress() {
        let info = ScheduleInfo::builder()
            .trigger(TriggerSpec::new(TriggerType::CustomEventCount, 5.0))
            .trigger(TriggerSpec::new(TriggerType::Foreground, 3.0).cancellation())
            .build()
            .unwrap();
        let mut entry = ScheduleEntry::new(ScheduleId::new(), info, now());
        entry.triggers[0].progress = 2.0;
        entry.triggers[1].progress = 1.0;

        entry.reset_cancellation_triggers();

        assert!((entry.triggers[0].progress - 2.0).abs() < f64::EPSILON);
        assert!((entry.triggers[1].progress - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn should_apply_partial_edits() {
        let mut entry = ScheduleEntry::new(ScheduleId::new(), valid_info(), now());
        let end = now() + chrono::Duration::days(1);

        entry.apply_edits(&ScheduleEdits {
            limit: Some(4),
            end: Some(end),
            priority: Some(-5),
            edit_grace_period: Some(Some(Duration::from_secs(30))),
            data: Some(serde_json::json!({"message": "updated"})),
            ..ScheduleEdits::default()
        });

        assert_eq!(entry.limit, 4);
        assert_eq!(entry.end, Some(end));
        assert_eq!(entry.priority, -5);
        assert_eq!(entry.edit_grace_period, Some(Duration::from_secs(30)));
        assert_eq!(entry.data, serde_json::json!({"message": "updated"}));
    }

    #[test]
    fn should_clear_grace_period_through_edits() {
        let info = ScheduleInfo::builder()
            .trigger(TriggerSpec::new(TriggerType::Foreground, 1.0))
            .edit_grace_period(Duration::from_secs(60))
            .build()
            .unwrap();
        let mut entry = ScheduleEntry::new(ScheduleId::new(), info, now());

        entry.apply_edits(&ScheduleEdits {
            edit_grace_period: Some(None),
            ..ScheduleEdits::default()
        });

        assert!(entry.edit_grace_period.is_none());
    }

    #[test]
    fn should_detect_attached_trigger_types() {
        let info = ScheduleInfo::builder()
            .trigger(TriggerSpec::new(TriggerType::ActiveSession, 1.0))
            .build()
            .unwrap();
        let entry = ScheduleEntry::new(ScheduleId::new(), info, now());

        assert!(entry.has_trigger_of(TriggerType::ActiveSession));
        assert!(!entry.has_trigger_of(TriggerType::Version));
    }

    #[test]
    fn should_roundtrip_entry_through_serde_json() {
        let entry = ScheduleEntry::new(ScheduleId::new(), valid_info(), now());
        let json = serde_json::to_string(&entry).unwrap();
        let parsed: ScheduleEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
    }
}
