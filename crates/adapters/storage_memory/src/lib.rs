//! # cadence-adapter-storage-memory
//!
//! In-memory implementation of the [`ScheduleStore`] port. Schedules live in
//! a `HashMap` behind an async `RwLock`; nothing survives a restart. Useful
//! for tests, demos, and embedders that treat schedules as ephemeral.
//!
//! ## Dependency rule
//!
//! Depends on `cadence-app` (port traits) and `cadence-domain` only.

use std::collections::HashMap;

use cadence_app::ports::ScheduleStore;
use cadence_domain::error::CadenceError;
use cadence_domain::id::ScheduleId;
use cadence_domain::schedule::{ExecutionState, ScheduleEntry};
use cadence_domain::time::Timestamp;
use cadence_domain::trigger::{TriggerEntry, TriggerType};
use tokio::sync::RwLock;

/// Schedule store backed by process memory.
#[derive(Default)]
pub struct MemoryScheduleStore {
    entries: RwLock<HashMap<ScheduleId, ScheduleEntry>>,
}

impl MemoryScheduleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScheduleStore for MemoryScheduleStore {
    async fn save_entries(&self, entries: &[ScheduleEntry]) -> Result<(), CadenceError> {
        let mut store = self.entries.write().await;
        for entry in entries {
            store.insert(entry.id, entry.clone());
        }
        Ok(())
    }

    async fn save_triggers(&self, triggers: &[TriggerEntry]) -> Result<(), CadenceError> {
        let mut store = self.entries.write().await;
        for trigger in triggers {
            let Some(entry) = store.get_mut(&trigger.schedule_id) else {
                continue;
            };
            if let Some(slot) = entry.triggers.iter_mut().find(|t| t.id == trigger.id) {
                *slot = trigger.clone();
            }
        }
        Ok(())
    }

    async fn get(&self, id: ScheduleId) -> Result<Option<ScheduleEntry>, CadenceError> {
        Ok(self.entries.read().await.get(&id).cloned())
    }

    async fn get_many(&self, ids: &[ScheduleId]) -> Result<Vec<ScheduleEntry>, CadenceError> {
        let store = self.entries.read().await;
        Ok(ids.iter().filter_map(|id| store.get(id).cloned()).collect())
    }

    async fn get_all(&self) -> Result<Vec<ScheduleEntry>, CadenceError> {
        Ok(self.entries.read().await.values().cloned().collect())
    }

    async fn get_by_state(
        &self,
        states: &[ExecutionState],
    ) -> Result<Vec<ScheduleEntry>, CadenceError> {
        let store = self.entries.read().await;
        Ok(store
            .values()
            .filter(|entry| states.contains(&entry.execution_state()))
            .cloned()
            .collect())
    }

    async fn get_by_group(&self, group: &str) -> Result<Vec<ScheduleEntry>, CadenceError> {
        let store = self.entries.read().await;
        Ok(store
            .values()
            .filter(|entry| entry.group.as_deref() == Some(group))
            .cloned()
            .collect())
    }

    async fn get_active_expired(
        &self,
        now: Timestamp,
    ) -> Result<Vec<ScheduleEntry>, CadenceError> {
        let store = self.entries.read().await;
        Ok(store
            .values()
            .filter(|entry| {
                entry.execution_state() != ExecutionState::Finished && entry.is_expired(now)
            })
            .cloned()
            .collect())
    }

    async fn active_triggers(
        &self,
        kind: TriggerType,
        schedule_id: Option<ScheduleId>,
    ) -> Result<Vec<TriggerEntry>, CadenceError> {
        let store = self.entries.read().await;
        let mut triggers = Vec::new();
        for entry in store.values() {
            if schedule_id.is_some_and(|id| id != entry.id) {
                continue;
            }
            for trigger in &entry.triggers {
                if trigger.kind == kind
                    && entry
                        .execution_state()
                        .evaluates_triggers(trigger.is_cancellation)
                {
                    triggers.push(trigger.clone());
                }
            }
        }
        Ok(triggers)
    }

    async fn delete_many(&self, ids: &[ScheduleId]) -> Result<(), CadenceError> {
        let mut store = self.entries.write().await;
        for id in ids {
            store.remove(id);
        }
        Ok(())
    }

    async fn delete_group(&self, group: &str) -> Result<bool, CadenceError> {
        let mut store = self.entries.write().await;
        let before = store.len();
        store.retain(|_, entry| entry.group.as_deref() != Some(group));
        Ok(store.len() != before)
    }

    async fn delete_all(&self) -> Result<(), CadenceError> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize, CadenceError> {
        Ok(self.entries.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use cadence_domain::schedule::ScheduleInfo;
    use cadence_domain::time::now;
    use cadence_domain::trigger::TriggerSpec;

    use super::*;

    fn entry_with(specs: Vec<TriggerSpec>, group: Option<&str>) -> ScheduleEntry {
        let mut builder = ScheduleInfo::builder();
        for spec in specs {
            builder = builder.trigger(spec);
        }
        if let Some(group) = group {
            builder = builder.group(group);
        }
        ScheduleEntry::new(ScheduleId::new(), builder.build().unwrap(), now())
    }

    fn foreground_entry() -> ScheduleEntry {
        entry_with(vec![TriggerSpec::new(TriggerType::Foreground, 1.0)], None)
    }

    #[tokio::test]
    async fn should_save_and_fetch_entries() {
        let store = MemoryScheduleStore::new();
        let entry = foreground_entry();

        store.save_entries(std::slice::from_ref(&entry)).await.unwrap();

        assert_eq!(store.get(entry.id).await.unwrap(), Some(entry.clone()));
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get_many(&[entry.id]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn should_overwrite_trigger_progress_in_place() {
        let store = MemoryScheduleStore::new();
        let entry = foreground_entry();
        store.save_entries(std::slice::from_ref(&entry)).await.unwrap();

        let mut trigger = entry.triggers[0].clone();
        trigger.progress = 0.5;
        store.save_triggers(std::slice::from_ref(&trigger)).await.unwrap();

        let stored = store.get(entry.id).await.unwrap().unwrap();
        assert!((stored.triggers[0].progress - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn should_filter_entries_by_state() {
        let store = MemoryScheduleStore::new();
        let idle = foreground_entry();
        let mut finished = foreground_entry();
        finished.set_execution_state(ExecutionState::Finished, now());
        store.save_entries(&[idle.clone(), finished.clone()]).await.unwrap();

        let found = store
            .get_by_state(&[ExecutionState::Finished])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, finished.id);
    }

    #[tokio::test]
    async fn should_report_only_active_expired_entries() {
        let store = MemoryScheduleStore::new();
        let fresh = foreground_entry();
        let mut expired = foreground_entry();
        expired.end = Some(now() - chrono::TimeDelta::seconds(10));
        let mut finished = expired.clone();
        finished.set_execution_state(ExecutionState::Finished, now());
        // Separate identity so both live in the store.
        finished.id = ScheduleId::new();
        store
            .save_entries(&[fresh, expired.clone(), finished])
            .await
            .unwrap();

        let found = store.get_active_expired(now()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, expired.id);
    }

    #[tokio::test]
    async fn should_scope_active_triggers_by_state_and_flavor() {
        let store = MemoryScheduleStore::new();
        let entry = entry_with(
            vec![
                TriggerSpec::new(TriggerType::Foreground, 1.0),
                TriggerSpec::new(TriggerType::Foreground, 1.0).cancellation(),
            ],
            None,
        );
        store.save_entries(std::slice::from_ref(&entry)).await.unwrap();

        // Idle: standard trigger only.
        let found = store
            .active_triggers(TriggerType::Foreground, None)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(!found[0].is_cancellation);

        // Pending: cancellation trigger only.
        let mut pending = entry;
        pending.set_execution_state(ExecutionState::TimeDelayed, now());
        store.save_entries(std::slice::from_ref(&pending)).await.unwrap();
        let found = store
            .active_triggers(TriggerType::Foreground, None)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].is_cancellation);
    }

    #[tokio::test]
    async fn should_scope_active_triggers_to_one_schedule() {
        let store = MemoryScheduleStore::new();
        let a = foreground_entry();
        let b = foreground_entry();
        store.save_entries(&[a.clone(), b]).await.unwrap();

        let found = store
            .active_triggers(TriggerType::Foreground, Some(a.id))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].schedule_id, a.id);
    }

    #[tokio::test]
    async fn should_delete_by_group() {
        let store = MemoryScheduleStore::new();
        let grouped = entry_with(
            vec![TriggerSpec::new(TriggerType::Foreground, 1.0)],
            Some("campaign"),
        );
        let loose = foreground_entry();
        store.save_entries(&[grouped, loose.clone()]).await.unwrap();

        assert!(store.delete_group("campaign").await.unwrap());
        assert!(!store.delete_group("campaign").await.unwrap());
        assert_eq!(store.get_all().await.unwrap(), vec![loose]);
    }

    #[tokio::test]
    async fn should_delete_everything() {
        let store = MemoryScheduleStore::new();
        store
            .save_entries(&[foreground_entry(), foreground_entry()])
            .await
            .unwrap();

        store.delete_all().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
