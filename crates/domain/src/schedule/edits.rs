//! Schedule edits — partial updates applied to an existing schedule.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// A partial set of schedule fields to overwrite.
///
/// Every field is optional; omitted fields are left untouched. Edits can
/// revive a finished schedule (by raising its limit or pushing out its end
/// date) or finish an active one (the reverse).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleEdits {
    /// New execution limit.
    pub limit: Option<u32>,
    /// New start of the schedule window.
    pub start: Option<Timestamp>,
    /// New end of the schedule window.
    pub end: Option<Timestamp>,
    /// New priority (lower runs first).
    pub priority: Option<i32>,
    /// New post-execution cooldown.
    pub interval: Option<Duration>,
    /// New edit grace period. `Some(None)` clears the grace period so the
    /// schedule is deleted as soon as it finishes.
    pub edit_grace_period: Option<Option<Duration>>,
    /// New opaque driver payload.
    pub data: Option<serde_json::Value>,
}

impl ScheduleEdits {
    /// Whether the edit set changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
