//! Alarm registry for delay and interval waits.
//!
//! Each armed alarm is a spawned task racing a sleep against a cancellation
//! channel. Cancelling or re-arming drops the previous task's cancel sender,
//! and a monotonically increasing token lets the orchestrator reject a fire
//! from an alarm that was replaced while the message was in flight.

use std::collections::HashMap;
use std::time::Duration;

use cadence_domain::id::ScheduleId;
use tokio::sync::{mpsc, oneshot};

use crate::ports::DelayScheduler;

/// What an alarm is waiting for.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AlarmKind {
    /// The schedule's post-trigger delay.
    Delay,
    /// The pause between two executions of the same schedule.
    Interval,
}

/// Message sent to the orchestrator when an alarm elapses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AlarmFired {
    pub schedule_id: ScheduleId,
    pub kind: AlarmKind,
    pub token: u64,
}

struct ArmedAlarm {
    token: u64,
    _cancel: oneshot::Sender<()>,
}

/// Bookkeeping for the alarms of every live schedule.
///
/// Owned by the orchestrator task, so no locking: arming, cancelling and
/// validating fires all happen on the same thread of control.
pub struct AlarmRegistry<P> {
    scheduler: P,
    fired_tx: mpsc::UnboundedSender<AlarmFired>,
    armed: HashMap<(ScheduleId, AlarmKind), ArmedAlarm>,
    next_token: u64,
}

impl<P: DelayScheduler + Clone> AlarmRegistry<P> {
    pub fn new(scheduler: P, fired_tx: mpsc::UnboundedSender<AlarmFired>) -> Self {
        Self {
            scheduler,
            fired_tx,
            armed: HashMap::new(),
            next_token: 0,
        }
    }

    /// Arm an alarm, replacing any previous alarm of the same kind for the
    /// same schedule. The replaced alarm never fires.
    pub fn arm(&mut self, schedule_id: ScheduleId, kind: AlarmKind, duration: Duration) {
        self.next_token += 1;
        let token = self.next_token;
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let scheduler = self.scheduler.clone();
        let fired_tx = self.fired_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = scheduler.sleep(duration) => {
                    let _ = fired_tx.send(AlarmFired { schedule_id, kind, token });
                }
                _ = cancel_rx => {}
            }
        });
        self.armed.insert(
            (schedule_id, kind),
            ArmedAlarm {
                token,
                _cancel: cancel_tx,
            },
        );
    }

    /// Cancel one alarm if armed.
    pub fn cancel(&mut self, schedule_id: ScheduleId, kind: AlarmKind) {
        self.armed.remove(&(schedule_id, kind));
    }

    /// Cancel every alarm of a schedule.
    pub fn cancel_all(&mut self, schedule_id: ScheduleId) {
        self.armed.remove(&(schedule_id, AlarmKind::Delay));
        self.armed.remove(&(schedule_id, AlarmKind::Interval));
    }

    /// Consume a fire notification. Returns `true` when the fire belongs to
    /// the currently armed alarm, `false` when it is stale.
    pub fn acknowledge(&mut self, fired: AlarmFired) -> bool {
        let key = (fired.schedule_id, fired.kind);
        match self.armed.get(&key) {
            Some(armed) if armed.token == fired.token => {
                self.armed.remove(&key);
                true
            }
            _ => false,
        }
    }

    /// Whether an alarm of the given kind is currently armed.
    #[must_use]
    pub fn is_armed(&self, schedule_id: ScheduleId, kind: AlarmKind) -> bool {
        self.armed.contains_key(&(schedule_id, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::TokioDelayScheduler;

    fn registry() -> (
        AlarmRegistry<TokioDelayScheduler>,
        mpsc::UnboundedReceiver<AlarmFired>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (AlarmRegistry::new(TokioDelayScheduler, tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn should_fire_after_duration() {
        let (mut registry, mut rx) = registry();
        let id = ScheduleId::new();
        registry.arm(id, AlarmKind::Delay, Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(10)).await;
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.schedule_id, id);
        assert_eq!(fired.kind, AlarmKind::Delay);
        assert!(registry.acknowledge(fired));
        assert!(!registry.is_armed(id, AlarmKind::Delay));
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_fire_after_cancel() {
        let (mut registry, mut rx) = registry();
        let id = ScheduleId::new();
        registry.arm(id, AlarmKind::Interval, Duration::from_secs(5));
        registry.cancel(id, AlarmKind::Interval);

        tokio::time::advance(Duration::from_secs(60)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn should_reject_stale_fire_after_rearm() {
        let (mut registry, mut rx) = registry();
        let id = ScheduleId::new();
        registry.arm(id, AlarmKind::Delay, Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(1)).await;
        let stale = rx.recv().await.unwrap();

        // Re-armed before the fire was processed.
        registry.arm(id, AlarmKind::Delay, Duration::from_secs(30));
        assert!(!registry.acknowledge(stale));
        assert!(registry.is_armed(id, AlarmKind::Delay));
    }

    #[tokio::test(start_paused = true)]
    async fn should_track_delay_and_interval_independently() {
        let (mut registry, mut rx) = registry();
        let id = ScheduleId::new();
        registry.arm(id, AlarmKind::Delay, Duration::from_secs(2));
        registry.arm(id, AlarmKind::Interval, Duration::from_secs(4));
        registry.cancel(id, AlarmKind::Delay);

        tokio::time::advance(Duration::from_secs(4)).await;
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.kind, AlarmKind::Interval);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn should_cancel_all_kinds_at_once() {
        let (mut registry, mut rx) = registry();
        let id = ScheduleId::new();
        registry.arm(id, AlarmKind::Delay, Duration::from_secs(1));
        registry.arm(id, AlarmKind::Interval, Duration::from_secs(1));
        registry.cancel_all(id);

        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }
}
