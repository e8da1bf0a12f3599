//! Execution state machine — the seven per-schedule lifecycle states.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a schedule.
///
/// Standard flow: `Idle` → (`TimeDelayed` →) `PreparingSchedule` →
/// `WaitingScheduleConditions` → `Executing` → (`Paused` →) back to `Idle`,
/// or `Finished` once the schedule expires or reaches its limit.
/// `Finished` is terminal except for edits that revive the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Active, not yet triggered. Only standard triggers are evaluated.
    Idle,
    /// Waiting for a time delay to elapse. Only cancellation triggers
    /// are evaluated.
    TimeDelayed,
    /// The driver is preparing the schedule. Only cancellation triggers
    /// are evaluated.
    PreparingSchedule,
    /// Waiting for app-state/screen/region conditions. Only cancellation
    /// triggers are evaluated.
    WaitingScheduleConditions,
    /// The driver is executing the schedule.
    Executing,
    /// Post-execution cooldown while an interval elapses.
    Paused,
    /// Expired or at its limit; retained for the edit grace period.
    Finished,
}

impl ExecutionState {
    /// All states, in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::Idle,
        Self::TimeDelayed,
        Self::PreparingSchedule,
        Self::WaitingScheduleConditions,
        Self::Executing,
        Self::Paused,
        Self::Finished,
    ];

    /// Whether triggers of the given flavor are evaluated in this state.
    ///
    /// Standard triggers only fire idle schedules; cancellation triggers
    /// only abort schedules that are delayed, preparing, or waiting.
    #[must_use]
    pub fn evaluates_triggers(self, is_cancellation: bool) -> bool {
        if is_cancellation {
            matches!(
                self,
                Self::TimeDelayed | Self::PreparingSchedule | Self::WaitingScheduleConditions
            )
        } else {
            matches!(self, Self::Idle)
        }
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::TimeDelayed => "time_delayed",
            Self::PreparingSchedule => "preparing_schedule",
            Self::WaitingScheduleConditions => "waiting_schedule_conditions",
            Self::Executing => "executing",
            Self::Paused => "paused",
            Self::Finished => "finished",
        };
        f.write_str(name)
    }
}
