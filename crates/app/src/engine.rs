//! Automation engine — the serialized orchestrator around schedules.
//!
//! The engine owns a single worker task that processes every mutation in
//! arrival order: API calls, activity events, alarm fires and results from
//! spawned prepare/execute tasks all funnel into one message channel, so
//! schedule state never needs a lock. Condition checks run on a separate
//! interaction task and are bounded by a timeout; a check that does not
//! answer in time counts as "not ready" and the schedule simply waits for
//! the next nudge.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cadence_domain::error::{CadenceError, NotFoundError, ValidationError};
use cadence_domain::event::ActivityEvent;
use cadence_domain::id::ScheduleId;
use cadence_domain::schedule::{AppState, ExecutionState, ScheduleEdits, ScheduleEntry, ScheduleInfo};
use cadence_domain::time::Timestamp;
use cadence_domain::trigger::TriggerType;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::accounting;
use crate::alarms::{AlarmFired, AlarmKind, AlarmRegistry};
use crate::compound::CompoundTracker;
use crate::ports::{ActivityObserver, DelayScheduler, Driver, PrepareResult, ScheduleStore};

/// Engine tuning knobs.
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// Maximum number of schedules held at once.
    pub schedule_limit: usize,
    /// How long a condition check may take before it counts as not ready.
    pub condition_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schedule_limit: 100,
            condition_timeout: Duration::from_secs(5),
        }
    }
}

impl EngineConfig {
    /// Check configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::Validation`] when the schedule limit or the
    /// condition timeout is zero.
    pub fn validate(&self) -> Result<(), CadenceError> {
        if self.schedule_limit == 0 {
            return Err(ValidationError::NonPositiveLimit.into());
        }
        if self.condition_timeout.is_zero() {
            return Err(ValidationError::NonPositiveTimeout.into());
        }
        Ok(())
    }
}

/// Notifications published by the engine.
#[derive(Clone, Debug)]
pub enum EngineEvent {
    /// A schedule passed its end date and was finished.
    ScheduleExpired { schedule: ScheduleEntry },
    /// A schedule reached its execution limit and was finished.
    ScheduleLimitReached { schedule: ScheduleEntry },
    /// A schedule finished an execution.
    ScheduleExecuted { schedule: ScheduleEntry },
}

enum EngineMsg {
    Schedule {
        infos: Vec<ScheduleInfo>,
        reply: oneshot::Sender<Result<Vec<ScheduleEntry>, CadenceError>>,
    },
    Cancel {
        id: ScheduleId,
        reply: oneshot::Sender<Result<bool, CadenceError>>,
    },
    CancelMany {
        ids: Vec<ScheduleId>,
        reply: oneshot::Sender<Result<(), CadenceError>>,
    },
    CancelGroup {
        group: String,
        reply: oneshot::Sender<Result<bool, CadenceError>>,
    },
    CancelGroups {
        groups: Vec<String>,
        reply: oneshot::Sender<Result<bool, CadenceError>>,
    },
    CancelAll {
        reply: oneshot::Sender<Result<(), CadenceError>>,
    },
    Get {
        id: ScheduleId,
        reply: oneshot::Sender<Result<Option<ScheduleEntry>, CadenceError>>,
    },
    GetMany {
        ids: Vec<ScheduleId>,
        reply: oneshot::Sender<Result<Vec<ScheduleEntry>, CadenceError>>,
    },
    GetAll {
        reply: oneshot::Sender<Result<Vec<ScheduleEntry>, CadenceError>>,
    },
    GetGroup {
        group: String,
        reply: oneshot::Sender<Result<Vec<ScheduleEntry>, CadenceError>>,
    },
    Edit {
        id: ScheduleId,
        edits: ScheduleEdits,
        reply: oneshot::Sender<Result<ScheduleEntry, CadenceError>>,
    },
    Activity(ActivityEvent),
    ConditionsChanged,
    PrepareFinished {
        id: ScheduleId,
        result: PrepareResult,
    },
    ExecutionFinished {
        id: ScheduleId,
    },
    Stop,
}

struct ConditionRequest<T> {
    entry: ScheduleEntry,
    schedule: T,
    reply: oneshot::Sender<bool>,
}

/// Handle to a running engine.
///
/// Cheap to clone; all methods forward to the worker task and await its
/// reply. Dropping every handle does not stop the worker, call
/// [`AutomationEngine::stop`] for that.
#[derive(Clone)]
pub struct AutomationEngine {
    msg_tx: mpsc::UnboundedSender<EngineMsg>,
    events: broadcast::Sender<EngineEvent>,
    paused: Arc<AtomicBool>,
}

impl AutomationEngine {
    /// Validate the configuration and spawn the engine tasks.
    ///
    /// Must be called from within a tokio runtime. Recovery of persisted
    /// schedules runs on the worker before any message is processed, so
    /// callers may use the handle immediately.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::Validation`] when the configuration is
    /// invalid; see [`EngineConfig::validate`].
    pub fn start<S, D, O, P>(
        config: EngineConfig,
        store: S,
        driver: D,
        observer: O,
        scheduler: P,
    ) -> Result<Self, CadenceError>
    where
        S: ScheduleStore,
        D: Driver + Clone,
        O: ActivityObserver + Clone,
        P: DelayScheduler + Clone,
    {
        config.validate()?;

        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (alarm_tx, alarm_rx) = mpsc::unbounded_channel();
        let (cond_tx, cond_rx) = mpsc::channel(16);
        let (events, _) = broadcast::channel(32);
        let paused = Arc::new(AtomicBool::new(false));

        tokio::spawn(run_condition_checks(driver.clone(), observer.clone(), cond_rx));
        tokio::spawn(forward_activity(
            observer.clone(),
            msg_tx.clone(),
            Arc::clone(&paused),
        ));

        let worker = Worker {
            config,
            store,
            driver,
            observer,
            msg_tx: msg_tx.clone(),
            msg_rx,
            cond_tx,
            alarm_rx,
            alarms: AlarmRegistry::new(scheduler.clone(), alarm_tx),
            prepared: HashMap::new(),
            compound: CompoundTracker::new(scheduler.now()),
            clock: scheduler,
            session_active: false,
            version_payload: None,
            events: events.clone(),
        };
        tokio::spawn(worker.run());

        Ok(Self {
            msg_tx,
            events,
            paused,
        })
    }

    /// Create one schedule.
    ///
    /// # Errors
    ///
    /// Fails on invalid schedule data, when the engine is at capacity, or
    /// when storage fails.
    pub async fn schedule(&self, info: ScheduleInfo) -> Result<ScheduleEntry, CadenceError> {
        let mut entries = self.schedule_many(vec![info]).await?;
        entries
            .pop()
            .ok_or_else(|| CadenceError::Engine("schedule produced no entry".to_string()))
    }

    /// Create several schedules atomically against the capacity limit.
    ///
    /// # Errors
    ///
    /// Fails on invalid schedule data, when the engine is at capacity, or
    /// when storage fails.
    #[tracing::instrument(skip(self, infos), fields(count = infos.len()))]
    pub async fn schedule_many(
        &self,
        infos: Vec<ScheduleInfo>,
    ) -> Result<Vec<ScheduleEntry>, CadenceError> {
        self.request(|reply| EngineMsg::Schedule { infos, reply })
            .await?
    }

    /// Delete one schedule. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Fails when the engine has stopped or storage fails.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, id: ScheduleId) -> Result<bool, CadenceError> {
        self.request(|reply| EngineMsg::Cancel { id, reply }).await?
    }

    /// Delete several schedules. Unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Fails when the engine has stopped or storage fails.
    #[tracing::instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn cancel_many(&self, ids: Vec<ScheduleId>) -> Result<(), CadenceError> {
        self.request(|reply| EngineMsg::CancelMany { ids, reply })
            .await?
    }

    /// Delete every schedule in a group. Returns whether any existed.
    ///
    /// # Errors
    ///
    /// Fails when the engine has stopped or storage fails.
    #[tracing::instrument(skip(self, group))]
    pub async fn cancel_group(&self, group: impl Into<String>) -> Result<bool, CadenceError> {
        let group = group.into();
        self.request(|reply| EngineMsg::CancelGroup { group, reply })
            .await?
    }

    /// Delete every schedule in any of the given groups. Returns whether
    /// any existed.
    ///
    /// # Errors
    ///
    /// Fails when the engine has stopped or storage fails.
    #[tracing::instrument(skip(self, groups), fields(count = groups.len()))]
    pub async fn cancel_groups(&self, groups: Vec<String>) -> Result<bool, CadenceError> {
        self.request(|reply| EngineMsg::CancelGroups { groups, reply })
            .await?
    }

    /// Delete every schedule.
    ///
    /// # Errors
    ///
    /// Fails when the engine has stopped or storage fails.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_all(&self) -> Result<(), CadenceError> {
        self.request(|reply| EngineMsg::CancelAll { reply }).await?
    }

    /// Fetch one schedule.
    ///
    /// # Errors
    ///
    /// Fails when the engine has stopped or storage fails.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: ScheduleId) -> Result<Option<ScheduleEntry>, CadenceError> {
        self.request(|reply| EngineMsg::Get { id, reply }).await?
    }

    /// Fetch several schedules. Unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Fails when the engine has stopped or storage fails.
    #[tracing::instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn get_many(&self, ids: Vec<ScheduleId>) -> Result<Vec<ScheduleEntry>, CadenceError> {
        self.request(|reply| EngineMsg::GetMany { ids, reply })
            .await?
    }

    /// Fetch all schedules.
    ///
    /// # Errors
    ///
    /// Fails when the engine has stopped or storage fails.
    #[tracing::instrument(skip(self))]
    pub async fn get_all(&self) -> Result<Vec<ScheduleEntry>, CadenceError> {
        self.request(|reply| EngineMsg::GetAll { reply }).await?
    }

    /// Fetch all schedules in a group.
    ///
    /// # Errors
    ///
    /// Fails when the engine has stopped or storage fails.
    #[tracing::instrument(skip(self, group))]
    pub async fn get_group(&self, group: impl Into<String>) -> Result<Vec<ScheduleEntry>, CadenceError> {
        let group = group.into();
        self.request(|reply| EngineMsg::GetGroup { group, reply })
            .await?
    }

    /// Apply partial edits to a schedule and return the updated entry.
    ///
    /// Edits that lift the limit or push the end date out revive a finished
    /// schedule; edits that exhaust the limit or expire the window finish an
    /// active one.
    ///
    /// # Errors
    ///
    /// Fails when the schedule does not exist, the engine has stopped, or
    /// storage fails.
    #[tracing::instrument(skip(self, edits))]
    pub async fn edit(
        &self,
        id: ScheduleId,
        edits: ScheduleEdits,
    ) -> Result<ScheduleEntry, CadenceError> {
        self.request(|reply| EngineMsg::Edit { id, edits, reply })
            .await?
    }

    /// Pause or resume trigger processing. While paused, activity events
    /// are dropped without accounting. Resuming re-checks waiting
    /// schedules.
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
        if !paused {
            let _ = self.msg_tx.send(EngineMsg::ConditionsChanged);
        }
    }

    /// Ask the engine to re-check schedules waiting on conditions.
    pub fn conditions_changed(&self) {
        let _ = self.msg_tx.send(EngineMsg::ConditionsChanged);
    }

    /// Subscribe to engine notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Stop the worker task. Pending messages already queued are dropped.
    pub fn stop(&self) {
        let _ = self.msg_tx.send(EngineMsg::Stop);
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineMsg,
    ) -> Result<T, CadenceError> {
        let (tx, rx) = oneshot::channel();
        self.msg_tx.send(build(tx)).map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())
    }
}

fn stopped() -> CadenceError {
    CadenceError::Engine("engine stopped".to_string())
}

/// Forward activity events from the observer into the worker queue,
/// dropping them while the engine is paused.
async fn forward_activity<O: ActivityObserver>(
    observer: O,
    msg_tx: mpsc::UnboundedSender<EngineMsg>,
    paused: Arc<AtomicBool>,
) {
    let mut stream = BroadcastStream::new(observer.subscribe());
    while let Some(item) = stream.next().await {
        // Lagged receivers skip ahead; missed events are lost by contract.
        let Ok(event) = item else { continue };
        if paused.load(Ordering::Relaxed) {
            continue;
        }
        if msg_tx.send(EngineMsg::Activity(event)).is_err() {
            break;
        }
    }
}

/// Answer condition checks away from the worker so a slow readiness check
/// never wedges schedule processing past the configured timeout.
async fn run_condition_checks<D, O>(
    driver: D,
    observer: O,
    mut requests: mpsc::Receiver<ConditionRequest<D::Schedule>>,
) where
    D: Driver,
    O: ActivityObserver,
{
    while let Some(request) = requests.recv().await {
        let met = conditions_met(&request.entry, &observer)
            && driver.is_ready_to_execute(&request.schedule);
        let _ = request.reply.send(met);
    }
}

fn conditions_met<O: ActivityObserver>(entry: &ScheduleEntry, observer: &O) -> bool {
    match entry.app_state {
        AppState::Any => {}
        AppState::Foreground if !observer.is_foregrounded() => return false,
        AppState::Background if observer.is_foregrounded() => return false,
        _ => {}
    }
    if !entry.screens.is_empty() {
        let Some(screen) = observer.current_screen() else {
            return false;
        };
        if !entry.screens.contains(&screen) {
            return false;
        }
    }
    if let Some(region_id) = &entry.region_id
        && observer.current_region().as_ref() != Some(region_id)
    {
        return false;
    }
    true
}

enum FinishReason {
    Expired,
    LimitReached,
}

struct Worker<S, D, O, P>
where
    D: Driver,
{
    config: EngineConfig,
    store: S,
    driver: D,
    observer: O,
    msg_tx: mpsc::UnboundedSender<EngineMsg>,
    msg_rx: mpsc::UnboundedReceiver<EngineMsg>,
    cond_tx: mpsc::Sender<ConditionRequest<D::Schedule>>,
    alarm_rx: mpsc::UnboundedReceiver<AlarmFired>,
    alarms: AlarmRegistry<P>,
    clock: P,
    /// Built payloads for schedules between prepare and execute.
    prepared: HashMap<ScheduleId, D::Schedule>,
    compound: CompoundTracker,
    session_active: bool,
    version_payload: Option<serde_json::Value>,
    events: broadcast::Sender<EngineEvent>,
}

enum Next {
    Msg(EngineMsg),
    Alarm(AlarmFired),
    Closed,
}

impl<S, D, O, P> Worker<S, D, O, P>
where
    S: ScheduleStore,
    D: Driver + Clone,
    O: ActivityObserver,
    P: DelayScheduler + Clone,
{
    async fn run(mut self) {
        if let Err(err) = self.recover().await {
            tracing::error!(error = %err, "schedule recovery failed");
        }
        loop {
            let next = tokio::select! {
                msg = self.msg_rx.recv() => msg.map_or(Next::Closed, Next::Msg),
                fired = self.alarm_rx.recv() => fired.map_or(Next::Closed, Next::Alarm),
            };
            match next {
                Next::Msg(EngineMsg::Stop) | Next::Closed => break,
                Next::Msg(msg) => self.handle_msg(msg).await,
                Next::Alarm(fired) => self.on_alarm(fired).await,
            }
        }
        tracing::debug!("engine worker stopped");
    }

    async fn handle_msg(&mut self, msg: EngineMsg) {
        match msg {
            EngineMsg::Schedule { infos, reply } => {
                let _ = reply.send(self.create_schedules(infos).await);
            }
            EngineMsg::Cancel { id, reply } => {
                let _ = reply.send(self.cancel(id).await);
            }
            EngineMsg::CancelMany { ids, reply } => {
                let _ = reply.send(self.cancel_many(&ids).await);
            }
            EngineMsg::CancelGroup { group, reply } => {
                let _ = reply.send(self.cancel_group(&group).await);
            }
            EngineMsg::CancelGroups { groups, reply } => {
                let _ = reply.send(self.cancel_groups(&groups).await);
            }
            EngineMsg::CancelAll { reply } => {
                let _ = reply.send(self.cancel_everything().await);
            }
            EngineMsg::Get { id, reply } => {
                let _ = reply.send(self.store.get(id).await);
            }
            EngineMsg::GetMany { ids, reply } => {
                let _ = reply.send(self.store.get_many(&ids).await);
            }
            EngineMsg::GetAll { reply } => {
                let _ = reply.send(self.store.get_all().await);
            }
            EngineMsg::GetGroup { group, reply } => {
                let _ = reply.send(self.store.get_by_group(&group).await);
            }
            EngineMsg::Edit { id, edits, reply } => {
                let _ = reply.send(self.edit(id, edits).await);
            }
            EngineMsg::Activity(event) => self.process_activity(event).await,
            EngineMsg::ConditionsChanged => self.check_waiting().await,
            EngineMsg::PrepareFinished { id, result } => {
                self.on_prepare_finished(id, result).await;
            }
            EngineMsg::ExecutionFinished { id } => self.on_execution_finished(id).await,
            EngineMsg::Stop => {}
        }
    }

    // ── Startup ────────────────────────────────────────────────────

    /// Restore persisted schedules: finish what expired, re-arm pending
    /// alarms, re-prepare interrupted schedules, then replay the compound
    /// state and fire the app-init trigger.
    async fn recover(&mut self) -> Result<(), CadenceError> {
        let now = self.clock.now();
        self.session_active = self.observer.is_foregrounded();
        self.version_payload = self.observer.version_changed();

        self.cleanup(now).await;

        // Schedules interrupted mid-flight start their pipeline over.
        let mut interrupted = self
            .store
            .get_by_state(&[
                ExecutionState::PreparingSchedule,
                ExecutionState::WaitingScheduleConditions,
                ExecutionState::Executing,
            ])
            .await?;
        interrupted.sort_by_key(|entry| entry.priority);
        for entry in interrupted {
            self.start_preparing(entry).await;
        }

        for entry in self.store.get_by_state(&[ExecutionState::TimeDelayed]).await? {
            let remaining = entry
                .delay_finished_at
                .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO))
                .unwrap_or(Duration::ZERO)
                // A clock that jumped backward would otherwise stretch the
                // wait past the configured delay.
                .min(entry.delay);
            if remaining.is_zero() {
                self.start_preparing(entry).await;
            } else {
                self.alarms.arm(entry.id, AlarmKind::Delay, remaining);
            }
        }

        for mut entry in self.store.get_by_state(&[ExecutionState::Paused]).await? {
            let elapsed = (now - entry.state_changed_at())
                .to_std()
                .unwrap_or(Duration::ZERO);
            let remaining = entry.interval.saturating_sub(elapsed);
            if remaining.is_zero() {
                self.back_to_idle(&mut entry, now).await;
            } else {
                self.alarms.arm(entry.id, AlarmKind::Interval, remaining);
            }
        }

        if self.session_active {
            self.process_trigger_update(
                TriggerType::ActiveSession,
                serde_json::Value::Null,
                1.0,
                None,
            )
            .await;
        }
        if let Some(payload) = self.version_payload.clone() {
            self.process_trigger_update(TriggerType::Version, payload, 1.0, None)
                .await;
        }
        self.process_trigger_update(TriggerType::AppInit, serde_json::Value::Null, 1.0, None)
            .await;

        Ok(())
    }

    // ── API operations ─────────────────────────────────────────────

    async fn create_schedules(
        &mut self,
        infos: Vec<ScheduleInfo>,
    ) -> Result<Vec<ScheduleEntry>, CadenceError> {
        let now = self.clock.now();
        self.cleanup(now).await;

        for info in &infos {
            info.validate()?;
        }
        let stored = self.store.count().await?;
        if stored + infos.len() > self.config.schedule_limit {
            return Err(CadenceError::Engine(format!(
                "schedule limit of {} reached",
                self.config.schedule_limit
            )));
        }

        let entries: Vec<_> = infos
            .into_iter()
            .map(|info| ScheduleEntry::new(ScheduleId::new(), info, now))
            .collect();
        self.store.save_entries(&entries).await?;
        tracing::debug!(count = entries.len(), "schedules created");

        // Schedules created mid-session still observe the current
        // compound state.
        for entry in &entries {
            self.replay_compound(entry.id, None).await;
        }
        Ok(entries)
    }

    async fn cancel(&mut self, id: ScheduleId) -> Result<bool, CadenceError> {
        let existed = self.store.get(id).await?.is_some();
        if existed {
            self.store.delete_many(&[id]).await?;
            self.forget(id);
        }
        Ok(existed)
    }

    async fn cancel_many(&mut self, ids: &[ScheduleId]) -> Result<(), CadenceError> {
        for id in ids {
            self.forget(*id);
        }
        self.store.delete_many(ids).await
    }

    async fn cancel_group(&mut self, group: &str) -> Result<bool, CadenceError> {
        for entry in self.store.get_by_group(group).await? {
            self.forget(entry.id);
        }
        self.store.delete_group(group).await
    }

    async fn cancel_groups(&mut self, groups: &[String]) -> Result<bool, CadenceError> {
        let mut any = false;
        for group in groups {
            any |= self.cancel_group(group).await?;
        }
        Ok(any)
    }

    async fn cancel_everything(&mut self) -> Result<(), CadenceError> {
        for entry in self.store.get_all().await? {
            self.forget(entry.id);
        }
        self.store.delete_all().await
    }

    async fn edit(
        &mut self,
        id: ScheduleId,
        edits: ScheduleEdits,
    ) -> Result<ScheduleEntry, CadenceError> {
        let now = self.clock.now();
        self.cleanup(now).await;

        let mut entry = self.store.get(id).await?.ok_or(NotFoundError {
            kind: "Schedule",
            id: id.to_string(),
        })?;

        let was_finished = entry.execution_state() == ExecutionState::Finished;
        let cutoff = entry.state_changed_at();
        entry.apply_edits(&edits);

        let viable = !entry.is_over_limit() && !entry.is_expired(now);
        if was_finished && viable {
            entry.reset_cancellation_triggers();
            entry.set_execution_state(ExecutionState::Idle, now);
            self.store.save_entries(std::slice::from_ref(&entry)).await?;
            tracing::debug!(schedule = %id, "schedule revived by edit");
            // Only replay compound updates the schedule has not yet seen.
            self.replay_compound(id, Some(cutoff)).await;
        } else if !was_finished && !viable {
            let reason = if entry.is_expired(now) {
                FinishReason::Expired
            } else {
                FinishReason::LimitReached
            };
            self.finish(entry.clone(), now, reason).await;
            entry.set_execution_state(ExecutionState::Finished, now);
        } else {
            self.store.save_entries(std::slice::from_ref(&entry)).await?;
        }

        Ok(self.store.get(id).await?.unwrap_or(entry))
    }

    // ── Event processing ───────────────────────────────────────────

    async fn process_activity(&mut self, event: ActivityEvent) {
        let now = self.clock.now();
        match event {
            ActivityEvent::Foreground if !self.session_active => {
                self.session_active = true;
                self.compound.record(TriggerType::ActiveSession, now);
                self.process_trigger_update(
                    TriggerType::ActiveSession,
                    serde_json::Value::Null,
                    1.0,
                    None,
                )
                .await;
            }
            ActivityEvent::Background => self.session_active = false,
            _ => {}
        }

        let (kind, payload) = event.trigger_update();
        self.process_trigger_update(kind, payload, 1.0, None).await;
        if let Some((kind, payload, value)) = event.value_update() {
            self.process_trigger_update(kind, payload, value, None).await;
        }

        if event.changes_conditions() {
            self.check_waiting().await;
        }
    }

    /// Fold one update into every eligible trigger record, then act on the
    /// schedules whose goals were reached.
    async fn process_trigger_update(
        &mut self,
        kind: TriggerType,
        payload: serde_json::Value,
        amount: f64,
        scope: Option<ScheduleId>,
    ) {
        let triggers = match self.store.active_triggers(kind, scope).await {
            Ok(triggers) => triggers,
            Err(err) => {
                tracing::warn!(error = %err, %kind, "failed to load trigger records");
                return;
            }
        };
        if triggers.is_empty() {
            return;
        }

        let outcome = accounting::apply_update(triggers, &payload, amount);
        if outcome.is_empty() {
            return;
        }
        if let Err(err) = self.store.save_triggers(&outcome.updated).await {
            tracing::warn!(error = %err, %kind, "failed to persist trigger progress");
            return;
        }

        let cancelled: Vec<_> = outcome.cancelled.into_iter().collect();
        match self.store.get_many(&cancelled).await {
            Ok(entries) => {
                for mut entry in entries {
                    if entry.execution_state().evaluates_triggers(true) {
                        self.cancel_pending(&mut entry).await;
                    }
                }
            }
            Err(err) => tracing::warn!(error = %err, "failed to load cancelled schedules"),
        }

        let triggered: Vec<_> = outcome.triggered.into_iter().collect();
        match self.store.get_many(&triggered).await {
            Ok(mut entries) => {
                entries.retain(|entry| entry.execution_state() == ExecutionState::Idle);
                entries.sort_by_key(|entry| entry.priority);
                for entry in entries {
                    self.on_triggered(entry).await;
                }
            }
            Err(err) => tracing::warn!(error = %err, "failed to load triggered schedules"),
        }
    }

    async fn on_triggered(&mut self, mut entry: ScheduleEntry) {
        let now = self.clock.now();
        if entry.is_expired(now) {
            self.finish(entry, now, FinishReason::Expired).await;
            return;
        }
        tracing::debug!(schedule = %entry.id, "schedule triggered");
        entry.reset_cancellation_triggers();
        if entry.delay > Duration::ZERO {
            let finished_at = now
                + chrono::TimeDelta::from_std(entry.delay).unwrap_or(chrono::TimeDelta::MAX);
            entry.set_execution_state(ExecutionState::TimeDelayed, now);
            entry.delay_finished_at = Some(finished_at);
            let delay = entry.delay;
            if self.save(&entry).await {
                self.alarms.arm(entry.id, AlarmKind::Delay, delay);
            }
        } else {
            self.start_preparing(entry).await;
        }
    }

    async fn start_preparing(&mut self, mut entry: ScheduleEntry) {
        let now = self.clock.now();
        entry.set_execution_state(ExecutionState::PreparingSchedule, now);
        entry.delay_finished_at = None;
        if !self.save(&entry).await {
            return;
        }

        match self.driver.build(&entry) {
            Ok(schedule) => {
                self.prepared.insert(entry.id, schedule.clone());
                let driver = self.driver.clone();
                let msg_tx = self.msg_tx.clone();
                tokio::spawn(async move {
                    let result = driver.prepare(&entry, schedule).await;
                    let _ = msg_tx.send(EngineMsg::PrepareFinished {
                        id: entry.id,
                        result,
                    });
                });
            }
            Err(err) => {
                // The stored payload is unusable, keeping the schedule
                // around would wedge it forever.
                tracing::warn!(schedule = %entry.id, error = %err, "driver rejected schedule data, deleting");
                let id = entry.id;
                if let Err(err) = self.store.delete_many(&[id]).await {
                    tracing::warn!(schedule = %id, error = %err, "failed to delete schedule");
                }
                self.forget(id);
            }
        }
    }

    async fn on_prepare_finished(&mut self, id: ScheduleId, result: PrepareResult) {
        let Some(entry) = self.load(id).await else {
            self.prepared.remove(&id);
            return;
        };
        // The schedule may have been cancelled or edited while preparing.
        if entry.execution_state() != ExecutionState::PreparingSchedule {
            self.prepared.remove(&id);
            return;
        }
        // Expiry wins over whatever the driver decided.
        let now = self.clock.now();
        if entry.is_expired(now) {
            self.finish(entry, now, FinishReason::Expired).await;
            return;
        }
        match result {
            PrepareResult::Cancel => {
                if let Err(err) = self.store.delete_many(&[id]).await {
                    tracing::warn!(schedule = %id, error = %err, "failed to delete schedule");
                }
                self.forget(id);
            }
            PrepareResult::Continue => self.attempt_execution(entry).await,
            PrepareResult::Skip => {
                self.prepared.remove(&id);
                let mut entry = entry;
                self.back_to_idle(&mut entry, self.clock.now()).await;
            }
            PrepareResult::Penalize => {
                self.prepared.remove(&id);
                self.count_execution(entry).await;
            }
        }
    }

    async fn attempt_execution(&mut self, mut entry: ScheduleEntry) {
        let now = self.clock.now();
        if entry.is_expired(now) {
            self.finish(entry, now, FinishReason::Expired).await;
            return;
        }
        let Some(schedule) = self.prepared.get(&entry.id).cloned() else {
            // Payload lost (e.g. recovery); run the pipeline again.
            self.start_preparing(entry).await;
            return;
        };

        if self.check_conditions(&entry, schedule.clone()).await {
            entry.set_execution_state(ExecutionState::Executing, now);
            if !self.save(&entry).await {
                return;
            }
            self.prepared.remove(&entry.id);
            let driver = self.driver.clone();
            let msg_tx = self.msg_tx.clone();
            tokio::spawn(async move {
                let id = entry.id;
                driver.execute(&entry, schedule).await;
                let _ = msg_tx.send(EngineMsg::ExecutionFinished { id });
            });
        } else if entry.execution_state() != ExecutionState::WaitingScheduleConditions {
            entry.set_execution_state(ExecutionState::WaitingScheduleConditions, now);
            self.save(&entry).await;
        }
    }

    /// Round-trip a condition check through the interaction task. No
    /// answer within the configured timeout counts as not ready.
    async fn check_conditions(&self, entry: &ScheduleEntry, schedule: D::Schedule) -> bool {
        let (reply, rx) = oneshot::channel();
        let request = ConditionRequest {
            entry: entry.clone(),
            schedule,
            reply,
        };
        if self.cond_tx.send(request).await.is_err() {
            return false;
        }
        match tokio::time::timeout(self.config.condition_timeout, rx).await {
            Ok(Ok(met)) => met,
            Ok(Err(_)) => false,
            Err(_) => {
                tracing::warn!(schedule = %entry.id, "condition check timed out");
                false
            }
        }
    }

    async fn check_waiting(&mut self) {
        let mut entries = match self
            .store
            .get_by_state(&[ExecutionState::WaitingScheduleConditions])
            .await
        {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load waiting schedules");
                return;
            }
        };
        entries.sort_by_key(|entry| entry.priority);
        for entry in entries {
            self.attempt_execution(entry).await;
        }
    }

    async fn on_execution_finished(&mut self, id: ScheduleId) {
        let Some(entry) = self.load(id).await else {
            return;
        };
        if entry.execution_state() != ExecutionState::Executing {
            return;
        }
        let _ = self.events.send(EngineEvent::ScheduleExecuted {
            schedule: entry.clone(),
        });
        self.count_execution(entry).await;
    }

    /// Account one completed (or penalized) execution and route the
    /// schedule to finished, its interval pause, or back to idle.
    async fn count_execution(&mut self, mut entry: ScheduleEntry) {
        let now = self.clock.now();
        entry.count += 1;
        if entry.is_over_limit() {
            self.finish(entry, now, FinishReason::LimitReached).await;
        } else if entry.is_expired(now) {
            self.finish(entry, now, FinishReason::Expired).await;
        } else if entry.interval > Duration::ZERO {
            entry.set_execution_state(ExecutionState::Paused, now);
            let interval = entry.interval;
            if self.save(&entry).await {
                self.alarms.arm(entry.id, AlarmKind::Interval, interval);
            }
        } else {
            self.back_to_idle(&mut entry, now).await;
        }
    }

    async fn on_alarm(&mut self, fired: AlarmFired) {
        if !self.alarms.acknowledge(fired) {
            return;
        }
        let Some(mut entry) = self.load(fired.schedule_id).await else {
            return;
        };
        // The end date may have passed while the alarm was pending.
        let now = self.clock.now();
        if entry.is_expired(now) {
            self.finish(entry, now, FinishReason::Expired).await;
            return;
        }
        match fired.kind {
            AlarmKind::Delay => {
                if entry.execution_state() == ExecutionState::TimeDelayed {
                    self.start_preparing(entry).await;
                }
            }
            AlarmKind::Interval => {
                if entry.execution_state() == ExecutionState::Paused {
                    self.back_to_idle(&mut entry, self.clock.now()).await;
                }
            }
        }
    }

    // ── Shared transitions ─────────────────────────────────────────

    /// Abort a pending execution and return the schedule to idle.
    async fn cancel_pending(&mut self, entry: &mut ScheduleEntry) {
        tracing::debug!(schedule = %entry.id, "pending execution cancelled");
        self.alarms.cancel_all(entry.id);
        self.prepared.remove(&entry.id);
        entry.delay_finished_at = None;
        self.back_to_idle(entry, self.clock.now()).await;
    }

    async fn back_to_idle(&mut self, entry: &mut ScheduleEntry, now: Timestamp) {
        entry.reset_cancellation_triggers();
        entry.set_execution_state(ExecutionState::Idle, now);
        self.save(entry).await;
    }

    async fn finish(&mut self, mut entry: ScheduleEntry, now: Timestamp, reason: FinishReason) {
        self.forget(entry.id);
        entry.set_execution_state(ExecutionState::Finished, now);
        let event = match reason {
            FinishReason::Expired => EngineEvent::ScheduleExpired {
                schedule: entry.clone(),
            },
            FinishReason::LimitReached => EngineEvent::ScheduleLimitReached {
                schedule: entry.clone(),
            },
        };
        let _ = self.events.send(event);

        if entry.edit_grace_period.is_some() {
            self.save(&entry).await;
        } else if let Err(err) = self.store.delete_many(&[entry.id]).await {
            tracing::warn!(schedule = %entry.id, error = %err, "failed to delete finished schedule");
        }
    }

    /// Finish schedules past their end date and drop finished schedules
    /// past their retention deadline. Runs at startup and before every
    /// structural API operation.
    async fn cleanup(&mut self, now: Timestamp) {
        match self.store.get_active_expired(now).await {
            Ok(expired) => {
                for entry in expired {
                    self.finish(entry, now, FinishReason::Expired).await;
                }
            }
            Err(err) => tracing::warn!(error = %err, "failed to load expired schedules"),
        }

        match self.store.get_by_state(&[ExecutionState::Finished]).await {
            Ok(finished) => {
                let stale: Vec<_> = finished
                    .into_iter()
                    .filter(|entry| entry.retention_deadline().is_none_or(|at| now >= at))
                    .map(|entry| entry.id)
                    .collect();
                if !stale.is_empty()
                    && let Err(err) = self.store.delete_many(&stale).await
                {
                    tracing::warn!(error = %err, "failed to drop retained schedules");
                }
            }
            Err(err) => tracing::warn!(error = %err, "failed to load finished schedules"),
        }
    }

    /// Replay compound state to one schedule. `cutoff` skips signals the
    /// schedule already consumed before it was revived.
    async fn replay_compound(&mut self, id: ScheduleId, cutoff: Option<Timestamp>) {
        if self.session_active
            && self
                .compound
                .should_replay(TriggerType::ActiveSession, cutoff)
        {
            self.process_trigger_update(
                TriggerType::ActiveSession,
                serde_json::Value::Null,
                1.0,
                Some(id),
            )
            .await;
        }
        if let Some(payload) = self.version_payload.clone()
            && self.compound.should_replay(TriggerType::Version, cutoff)
        {
            self.process_trigger_update(TriggerType::Version, payload, 1.0, Some(id))
                .await;
        }
    }

    fn forget(&mut self, id: ScheduleId) {
        self.alarms.cancel_all(id);
        self.prepared.remove(&id);
    }

    async fn load(&self, id: ScheduleId) -> Option<ScheduleEntry> {
        match self.store.get(id).await {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(schedule = %id, error = %err, "failed to load schedule");
                None
            }
        }
    }

    async fn save(&self, entry: &ScheduleEntry) -> bool {
        match self.store.save_entries(std::slice::from_ref(entry)).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(schedule = %entry.id, error = %err, "failed to save schedule");
                false
            }
        }
    }
}
