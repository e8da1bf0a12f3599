//! Trigger accounting — pure progress arithmetic over trigger records.
//!
//! The orchestrator fetches the trigger records eligible for an update,
//! runs them through [`apply_update`], persists the returned records and
//! acts on the schedules whose goals were reached. Keeping the arithmetic
//! free of storage and channels makes the goal rules directly testable.

use std::collections::BTreeSet;

use cadence_domain::id::ScheduleId;
use cadence_domain::trigger::TriggerEntry;

/// Result of applying one activity update to a set of trigger records.
#[derive(Debug, Default)]
pub struct TriggerOutcome {
    /// Schedules whose standard trigger reached its goal.
    pub triggered: BTreeSet<ScheduleId>,
    /// Schedules whose cancellation trigger reached its goal.
    pub cancelled: BTreeSet<ScheduleId>,
    /// Trigger records whose progress changed and must be persisted.
    pub updated: Vec<TriggerEntry>,
}

impl TriggerOutcome {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triggered.is_empty() && self.cancelled.is_empty() && self.updated.is_empty()
    }
}

/// Advance every matching trigger record by `amount`.
///
/// Records whose predicate rejects `payload` are left untouched and omitted
/// from the outcome. A record that reaches its goal has its progress reset
/// to zero and its schedule collected in `triggered` or `cancelled`
/// depending on the record's role. When a schedule carries several matching
/// records it appears at most once per set.
#[must_use]
pub fn apply_update(
    triggers: Vec<TriggerEntry>,
    payload: &serde_json::Value,
    amount: f64,
) -> TriggerOutcome {
    let mut outcome = TriggerOutcome::default();
    for mut trigger in triggers {
        if !trigger.accepts(payload) {
            continue;
        }
        let reached = trigger.advance(amount);
        if reached {
            if trigger.is_cancellation {
                outcome.cancelled.insert(trigger.schedule_id);
            } else {
                outcome.triggered.insert(trigger.schedule_id);
            }
        }
        outcome.updated.push(trigger);
    }
    outcome
}

#[cfg(test)]
mod tests {
    use cadence_domain::trigger::{EventPredicate, TriggerSpec, TriggerType};
    use serde_json::json;

    use super::*;

    fn entry(goal: f64) -> TriggerEntry {
        TriggerSpec::new(TriggerType::CustomEventCount, goal).into_entry(ScheduleId::new())
    }

    #[test]
    fn should_accumulate_progress_below_goal() {
        let outcome = apply_update(vec![entry(3.0)], &json!({}), 1.0);
        assert!(outcome.triggered.is_empty());
        assert!(outcome.cancelled.is_empty());
        assert_eq!(outcome.updated.len(), 1);
        assert!((outcome.updated[0].progress - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn should_trigger_and_reset_when_goal_reached() {
        let mut trigger = entry(2.0);
        trigger.progress = 1.0;
        let schedule_id = trigger.schedule_id;

        let outcome = apply_update(vec![trigger], &json!({}), 1.0);
        assert!(outcome.triggered.contains(&schedule_id));
        assert!((outcome.updated[0].progress).abs() < f64::EPSILON);
    }

    #[test]
    fn should_route_cancellation_triggers_separately() {
        let trigger = TriggerSpec::new(TriggerType::Foreground, 1.0)
            .cancellation()
            .into_entry(ScheduleId::new());
        let schedule_id = trigger.schedule_id;

        let outcome = apply_update(vec![trigger], &json!({}), 1.0);
        assert!(outcome.triggered.is_empty());
        assert!(outcome.cancelled.contains(&schedule_id));
    }

    #[test]
    fn should_skip_records_rejected_by_predicate() {
        let trigger = TriggerSpec::new(TriggerType::CustomEventCount, 1.0)
            .with_predicate(EventPredicate::Equals {
                key: "name".into(),
                value: json!("purchase"),
            })
            .into_entry(ScheduleId::new());

        let outcome = apply_update(vec![trigger], &json!({"name": "browse"}), 1.0);
        assert!(outcome.is_empty());
    }

    #[test]
    fn should_dedupe_schedule_with_multiple_reaching_triggers() {
        let schedule_id = ScheduleId::new();
        let a = TriggerSpec::new(TriggerType::Foreground, 1.0).into_entry(schedule_id);
        let b = TriggerSpec::new(TriggerType::ActiveSession, 1.0).into_entry(schedule_id);

        let outcome = apply_update(vec![a, b], &json!({}), 1.0);
        assert_eq!(outcome.triggered.len(), 1);
        assert_eq!(outcome.updated.len(), 2);
    }

    #[test]
    fn should_overshoot_goal_in_one_step() {
        let trigger = entry(2.0);
        let schedule_id = trigger.schedule_id;

        let outcome = apply_update(vec![trigger], &json!({}), 5.0);
        assert!(outcome.triggered.contains(&schedule_id));
        assert!((outcome.updated[0].progress).abs() < f64::EPSILON);
    }
}
