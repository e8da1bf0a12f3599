//! Triggers — goal accumulators that arm or cancel schedules.
//!
//! A trigger watches one kind of occurrence and accumulates progress toward
//! a numeric goal. Standard triggers arm their schedule when the goal is
//! reached; cancellation triggers abort a pending execution instead.

use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, ValidationError};
use crate::id::{ScheduleId, TriggerId};

/// The kind of occurrence a trigger accumulates.
///
/// Discrete types are driven by one-shot events; compound types
/// (`ActiveSession`, `Version`) reflect continuous state and require the
/// engine's compound subscription machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// App moved to the foreground.
    Foreground,
    /// App moved to the background.
    Background,
    /// App finished initializing (fires once per engine start).
    AppInit,
    /// A screen was displayed.
    ScreenView,
    /// The device entered a region.
    RegionEnter,
    /// The device exited a region.
    RegionExit,
    /// A custom analytics event occurred (counts occurrences).
    CustomEventCount,
    /// A custom analytics event occurred (accumulates its value).
    CustomEventValue,
    /// An app session is active (compound).
    ActiveSession,
    /// The app version changed since the last run (compound).
    Version,
}

impl TriggerType {
    /// Whether this type is driven by continuous state rather than
    /// discrete events.
    #[must_use]
    pub fn is_compound(self) -> bool {
        matches!(self, Self::ActiveSession | Self::Version)
    }

    /// All compound trigger types.
    #[must_use]
    pub fn compound_types() -> [Self; 2] {
        [Self::ActiveSession, Self::Version]
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Foreground => "foreground",
            Self::Background => "background",
            Self::AppInit => "app_init",
            Self::ScreenView => "screen_view",
            Self::RegionEnter => "region_enter",
            Self::RegionExit => "region_exit",
            Self::CustomEventCount => "custom_event_count",
            Self::CustomEventValue => "custom_event_value",
            Self::ActiveSession => "active_session",
            Self::Version => "version",
        };
        f.write_str(name)
    }
}

/// A predicate evaluated against the triggering event payload.
///
/// When attached to a trigger, events whose payload fails the predicate do
/// not advance progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPredicate {
    /// The payload field at `key` equals `value`.
    Equals { key: String, value: serde_json::Value },
    /// The payload field at `key` is present.
    Exists { key: String },
    /// The whole payload equals `value` (useful for scalar payloads
    /// such as screen names).
    Is { value: serde_json::Value },
    /// All nested predicates hold.
    All { predicates: Vec<EventPredicate> },
    /// The nested predicate does not hold.
    Not { predicate: Box<EventPredicate> },
}

impl EventPredicate {
    /// Evaluate the predicate against an event payload.
    #[must_use]
    pub fn matches(&self, payload: &serde_json::Value) -> bool {
        match self {
            Self::Equals { key, value } => payload.get(key) == Some(value),
            Self::Exists { key } => payload.get(key).is_some(),
            Self::Is { value } => payload == value,
            Self::All { predicates } => predicates.iter().all(|p| p.matches(payload)),
            Self::Not { predicate } => !predicate.matches(payload),
        }
    }
}

/// A trigger description inside a schedule request, before the schedule
/// has an identity. Materialized into a [`TriggerEntry`] when the schedule
/// is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSpec {
    pub kind: TriggerType,
    pub goal: f64,
    #[serde(default)]
    pub is_cancellation: bool,
    #[serde(default)]
    pub predicate: Option<EventPredicate>,
}

impl TriggerSpec {
    /// Create a standard trigger description.
    #[must_use]
    pub fn new(kind: TriggerType, goal: f64) -> Self {
        Self {
            kind,
            goal,
            is_cancellation: false,
            predicate: None,
        }
    }

    /// Mark this description as a cancellation trigger.
    #[must_use]
    pub fn cancellation(mut self) -> Self {
        self.is_cancellation = true;
        self
    }

    /// Attach a payload predicate.
    #[must_use]
    pub fn with_predicate(mut self, predicate: EventPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Materialize the description into an entry owned by `schedule_id`.
    #[must_use]
    pub fn into_entry(self, schedule_id: ScheduleId) -> TriggerEntry {
        TriggerEntry {
            id: TriggerId::new(),
            schedule_id,
            kind: self.kind,
            goal: self.goal,
            progress: 0.0,
            is_cancellation: self.is_cancellation,
            predicate: self.predicate,
        }
    }
}

/// One trigger attached to a schedule.
///
/// Invariant: `progress` is always in `[0, goal)` after a completed update
/// batch — reaching the goal resets progress to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEntry {
    pub id: TriggerId,
    pub schedule_id: ScheduleId,
    pub kind: TriggerType,
    /// Numeric threshold; reaching it completes the trigger.
    pub goal: f64,
    /// Accumulated progress toward the goal.
    pub progress: f64,
    /// When `true`, reaching the goal cancels the schedule instead of
    /// arming it.
    pub is_cancellation: bool,
    /// Optional payload filter.
    pub predicate: Option<EventPredicate>,
}

impl TriggerEntry {
    /// Create a trigger for a schedule.
    #[must_use]
    pub fn new(schedule_id: ScheduleId, kind: TriggerType, goal: f64) -> Self {
        Self {
            id: TriggerId::new(),
            schedule_id,
            kind,
            goal,
            progress: 0.0,
            is_cancellation: false,
            predicate: None,
        }
    }

    /// Mark this trigger as a cancellation trigger.
    #[must_use]
    pub fn cancellation(mut self) -> Self {
        self.is_cancellation = true;
        self
    }

    /// Attach a payload predicate.
    #[must_use]
    pub fn with_predicate(mut self, predicate: EventPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::Validation`] when the goal is not strictly
    /// positive ([`ValidationError::NonPositiveGoal`]).
    pub fn validate(&self) -> Result<(), CadenceError> {
        if self.goal <= 0.0 {
            return Err(ValidationError::NonPositiveGoal.into());
        }
        Ok(())
    }

    /// Add `value` to progress; returns `true` when the goal was reached,
    /// in which case progress is reset to zero.
    pub fn advance(&mut self, value: f64) -> bool {
        self.progress += value;
        if self.progress >= self.goal {
            self.progress = 0.0;
            true
        } else {
            false
        }
    }

    /// Whether `payload` passes the attached predicate (vacuously true
    /// without one).
    #[must_use]
    pub fn accepts(&self, payload: &serde_json::Value) -> bool {
        self.predicate
            .as_ref()
            .is_none_or(|predicate| predicate.matches(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_classify_only_session_and_version_as_compound() {
        assert!(TriggerType::ActiveSession.is_compound());
        assert!(TriggerType::Version.is_compound());
        assert!(!TriggerType::Foreground.is_compound());
        assert!(!TriggerType::CustomEventCount.is_compound());
        assert_eq!(TriggerType::compound_types().len(), 2);
    }

    #[test]
    fn should_reach_goal_and_reset_progress() {
        let mut trigger = TriggerEntry::new(ScheduleId::new(), TriggerType::CustomEventCount, 3.0);
        assert!(!trigger.advance(1.0));
        assert!(!trigger.advance(1.0));
        assert!(trigger.advance(1.0));
        assert!((trigger.progress - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn should_reset_progress_when_overshooting_goal() {
        let mut trigger = TriggerEntry::new(ScheduleId::new(), TriggerType::CustomEventValue, 10.0);
        assert!(trigger.advance(25.0));
        assert!((trigger.progress - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn should_reject_non_positive_goal() {
        let trigger = TriggerEntry::new(ScheduleId::new(), TriggerType::Foreground, 0.0);
        assert!(matches!(
            trigger.validate(),
            Err(CadenceError::Validation(ValidationError::NonPositiveGoal))
        ));
    }

    #[test]
    fn should_accept_any_payload_without_predicate() {
        let trigger = TriggerEntry::new(ScheduleId::new(), TriggerType::ScreenView, 1.0);
        assert!(trigger.accepts(&serde_json::json!("any-screen")));
    }

    #[test]
    fn should_filter_payloads_through_equals_predicate() {
        let trigger = TriggerEntry::new(ScheduleId::new(), TriggerType::CustomEventCount, 1.0)
            .with_predicate(EventPredicate::Equals {
                key: "name".to_string(),
                value: serde_json::json!("purchase"),
            });

        assert!(trigger.accepts(&serde_json::json!({"name": "purchase"})));
        assert!(!trigger.accepts(&serde_json::json!({"name": "refund"})));
        assert!(!trigger.accepts(&serde_json::json!({})));
    }

    #[test]
    fn should_evaluate_scalar_payload_with_is_predicate() {
        let predicate = EventPredicate::Is {
            value: serde_json::json!("home"),
        };
        assert!(predicate.matches(&serde_json::json!("home")));
        assert!(!predicate.matches(&serde_json::json!("checkout")));
    }

    #[test]
    fn should_combine_predicates_with_all_and_not() {
        let predicate = EventPredicate::All {
            predicates: vec![
                EventPredicate::Exists {
                    key: "name".to_string(),
                },
                EventPredicate::Not {
                    predicate: Box::new(EventPredicate::Equals {
                        key: "name".to_string(),
                        value: serde_json::json!("ignored"),
                    }),
                },
            ],
        };

        assert!(predicate.matches(&serde_json::json!({"name": "purchase"})));
        assert!(!predicate.matches(&serde_json::json!({"name": "ignored"})));
        assert!(!predicate.matches(&serde_json::json!({})));
    }

    #[test]
    fn should_roundtrip_trigger_entry_through_serde_json() {
        let trigger = TriggerEntry::new(ScheduleId::new(), TriggerType::RegionEnter, 2.0)
            .cancellation()
            .with_predicate(EventPredicate::Equals {
                key: "region_id".to_string(),
                value: serde_json::json!("store-42"),
            });

        let json = serde_json::to_string(&trigger).unwrap();
        let parsed: TriggerEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, trigger);
    }
}
