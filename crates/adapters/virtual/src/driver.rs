//! Announcement driver.

use std::sync::Mutex;
use std::time::Duration;

use cadence_app::ports::{Driver, PrepareResult};
use cadence_domain::error::{CadenceError, DriverError};
use cadence_domain::schedule::ScheduleEntry;
use serde::Deserialize;

/// Payload understood by the [`AnnouncementDriver`].
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Announcement {
    pub message: String,
    /// How long displaying the announcement takes.
    #[serde(default)]
    pub display_seconds: u64,
}

/// Demo driver that "displays" announcements by logging them.
///
/// Every executed announcement is recorded so demos and tests can inspect
/// what ran.
#[derive(Default)]
pub struct AnnouncementDriver {
    displayed: Mutex<Vec<Announcement>>,
}

impl AnnouncementDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Announcements displayed so far, in execution order.
    #[must_use]
    pub fn displayed(&self) -> Vec<Announcement> {
        match self.displayed.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Driver for AnnouncementDriver {
    type Schedule = Announcement;

    fn build(&self, entry: &ScheduleEntry) -> Result<Self::Schedule, CadenceError> {
        serde_json::from_value(entry.data.clone())
            .map_err(|err| DriverError(format!("invalid announcement payload: {err}")).into())
    }

    async fn prepare(&self, entry: &ScheduleEntry, _schedule: Self::Schedule) -> PrepareResult {
        tracing::debug!(schedule = %entry.id, "announcement prepared");
        PrepareResult::Continue
    }

    fn is_ready_to_execute(&self, _schedule: &Self::Schedule) -> bool {
        true
    }

    async fn execute(&self, entry: &ScheduleEntry, schedule: Self::Schedule) {
        tracing::info!(schedule = %entry.id, message = %schedule.message, "announcement displayed");
        if schedule.display_seconds > 0 {
            tokio::time::sleep(Duration::from_secs(schedule.display_seconds)).await;
        }
        match self.displayed.lock() {
            Ok(mut guard) => guard.push(schedule),
            Err(poisoned) => poisoned.into_inner().push(schedule),
        }
    }
}

#[cfg(test)]
mod tests {
    use cadence_domain::id::ScheduleId;
    use cadence_domain::schedule::ScheduleInfo;
    use cadence_domain::time::now;
    use cadence_domain::trigger::{TriggerSpec, TriggerType};

    use super::*;

    fn entry(data: serde_json::Value) -> ScheduleEntry {
        let info = ScheduleInfo::builder()
            .trigger(TriggerSpec::new(TriggerType::Foreground, 1.0))
            .data(data)
            .build()
            .unwrap();
        ScheduleEntry::new(ScheduleId::new(), info, now())
    }

    #[test]
    fn should_build_announcement_from_payload() {
        let driver = AnnouncementDriver::new();
        let entry = entry(serde_json::json!({"message": "welcome"}));

        let announcement = driver.build(&entry).unwrap();
        assert_eq!(announcement.message, "welcome");
        assert_eq!(announcement.display_seconds, 0);
    }

    #[test]
    fn should_reject_malformed_payload() {
        let driver = AnnouncementDriver::new();
        let entry = entry(serde_json::json!({"not_a_message": true}));

        assert!(matches!(
            driver.build(&entry),
            Err(CadenceError::Driver(_))
        ));
    }

    #[tokio::test]
    async fn should_continue_after_prepare() {
        let driver = AnnouncementDriver::new();
        let entry = entry(serde_json::json!({"message": "welcome"}));
        let announcement = driver.build(&entry).unwrap();

        let result = driver.prepare(&entry, announcement).await;
        assert_eq!(result, PrepareResult::Continue);
    }

    #[tokio::test(start_paused = true)]
    async fn should_record_displayed_announcements() {
        let driver = AnnouncementDriver::new();
        let entry = entry(serde_json::json!({"message": "welcome", "display_seconds": 2}));
        let announcement = driver.build(&entry).unwrap();

        driver.execute(&entry, announcement.clone()).await;
        assert_eq!(driver.displayed(), vec![announcement]);
    }
}
