//! Compound trigger tracking.
//!
//! Session and version triggers fire on a state rather than a discrete
//! event: a schedule created in the middle of an active session must still
//! observe that session. The tracker records when each compound signal last
//! updated so the orchestrator can decide whether to replay it to a
//! schedule that just became eligible, without replaying signals the
//! schedule already consumed before it was edited back to life.

use std::collections::HashMap;

use cadence_domain::time::Timestamp;
use cadence_domain::trigger::TriggerType;

/// Last-update bookkeeping for the compound trigger signals.
#[derive(Debug)]
pub struct CompoundTracker {
    start: Timestamp,
    timestamps: HashMap<TriggerType, Timestamp>,
}

impl CompoundTracker {
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            start,
            timestamps: HashMap::new(),
        }
    }

    /// Record that a compound signal updated now.
    pub fn record(&mut self, kind: TriggerType, now: Timestamp) {
        self.timestamps.insert(kind, now);
    }

    /// When the signal last updated. A signal that never updated counts as
    /// updated at engine start, so freshly subscribed schedules observe the
    /// state established during recovery.
    #[must_use]
    pub fn last_update(&self, kind: TriggerType) -> Timestamp {
        self.timestamps.get(&kind).copied().unwrap_or(self.start)
    }

    /// Whether a schedule subscribing with the given cutoff should receive
    /// a replay of the signal. No cutoff means the schedule never saw any
    /// update and always replays.
    #[must_use]
    pub fn should_replay(&self, kind: TriggerType, cutoff: Option<Timestamp>) -> bool {
        match cutoff {
            None => true,
            Some(cutoff) => self.last_update(kind) > cutoff,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    #[test]
    fn should_default_last_update_to_start() {
        let start = cadence_domain::time::now();
        let tracker = CompoundTracker::new(start);
        assert_eq!(tracker.last_update(TriggerType::ActiveSession), start);
    }

    #[test]
    fn should_always_replay_without_cutoff() {
        let tracker = CompoundTracker::new(cadence_domain::time::now());
        assert!(tracker.should_replay(TriggerType::Version, None));
    }

    #[test]
    fn should_replay_when_signal_updated_after_cutoff() {
        let start = cadence_domain::time::now();
        let mut tracker = CompoundTracker::new(start);
        let cutoff = start + TimeDelta::seconds(10);
        tracker.record(TriggerType::ActiveSession, start + TimeDelta::seconds(20));
        assert!(tracker.should_replay(TriggerType::ActiveSession, Some(cutoff)));
    }

    #[test]
    fn should_not_replay_signal_already_consumed() {
        let start = cadence_domain::time::now();
        let mut tracker = CompoundTracker::new(start);
        tracker.record(TriggerType::ActiveSession, start + TimeDelta::seconds(5));
        let cutoff = start + TimeDelta::seconds(10);
        assert!(!tracker.should_replay(TriggerType::ActiveSession, Some(cutoff)));
    }

    #[test]
    fn should_track_signals_independently() {
        let start = cadence_domain::time::now();
        let mut tracker = CompoundTracker::new(start);
        let later = start + TimeDelta::seconds(30);
        tracker.record(TriggerType::Version, later);
        assert_eq!(tracker.last_update(TriggerType::Version), later);
        assert_eq!(tracker.last_update(TriggerType::ActiveSession), start);
    }
}
