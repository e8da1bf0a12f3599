//! Scriptable host application.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use cadence_app::ports::ActivityObserver;
use cadence_domain::event::ActivityEvent;
use tokio::sync::broadcast;

/// A simulated host application.
///
/// Drives the engine the way a real embedder would: every `track_*` call
/// updates the queryable state and broadcasts the matching activity event.
pub struct VirtualApp {
    foregrounded: AtomicBool,
    screen: Mutex<Option<String>>,
    region: Mutex<Option<String>>,
    version: Mutex<Option<serde_json::Value>>,
    events: broadcast::Sender<ActivityEvent>,
}

impl Default for VirtualApp {
    fn default() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            foregrounded: AtomicBool::new(false),
            screen: Mutex::new(None),
            region: Mutex::new(None),
            version: Mutex::new(None),
            events,
        }
    }
}

impl VirtualApp {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend the app moved to the foreground.
    pub fn foreground(&self) {
        self.foregrounded.store(true, Ordering::Relaxed);
        self.emit(ActivityEvent::Foreground);
    }

    /// Pretend the app moved to the background.
    pub fn background(&self) {
        self.foregrounded.store(false, Ordering::Relaxed);
        *lock(&self.screen) = None;
        self.emit(ActivityEvent::Background);
    }

    /// Pretend a screen was displayed.
    pub fn track_screen(&self, name: impl Into<String>) {
        let name = name.into();
        *lock(&self.screen) = Some(name.clone());
        self.emit(ActivityEvent::ScreenTracked { name });
    }

    /// Pretend the device entered a region.
    pub fn enter_region(&self, region_id: impl Into<String>) {
        let region_id = region_id.into();
        *lock(&self.region) = Some(region_id.clone());
        let payload = serde_json::json!({ "region_id": region_id });
        self.emit(ActivityEvent::RegionEnter { region_id, payload });
    }

    /// Pretend the device left a region.
    pub fn exit_region(&self, region_id: impl Into<String>) {
        let region_id = region_id.into();
        let mut current = lock(&self.region);
        if current.as_deref() == Some(region_id.as_str()) {
            *current = None;
        }
        drop(current);
        let payload = serde_json::json!({ "region_id": region_id });
        self.emit(ActivityEvent::RegionExit { region_id, payload });
    }

    /// Record a custom analytics event.
    pub fn track_event(&self, payload: serde_json::Value, value: Option<f64>) {
        self.emit(ActivityEvent::CustomEvent { payload, value });
    }

    /// Simulate an app-version change for the next engine start.
    pub fn set_version_changed(&self, payload: serde_json::Value) {
        *lock(&self.version) = Some(payload);
    }

    fn emit(&self, event: ActivityEvent) {
        // Nobody listening yet is fine.
        let _ = self.events.send(event);
    }
}

impl ActivityObserver for VirtualApp {
    fn is_foregrounded(&self) -> bool {
        self.foregrounded.load(Ordering::Relaxed)
    }

    fn current_screen(&self) -> Option<String> {
        lock(&self.screen).clone()
    }

    fn current_region(&self) -> Option<String> {
        lock(&self.region).clone()
    }

    fn version_changed(&self) -> Option<serde_json::Value> {
        lock(&self.version).clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<ActivityEvent> {
        self.events.subscribe()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn should_broadcast_foreground_transitions() {
        let app = VirtualApp::new();
        let mut events = app.subscribe();

        app.foreground();
        assert!(app.is_foregrounded());
        assert_eq!(events.recv().await.unwrap(), ActivityEvent::Foreground);

        app.background();
        assert!(!app.is_foregrounded());
        assert_eq!(events.recv().await.unwrap(), ActivityEvent::Background);
    }

    #[tokio::test]
    async fn should_track_current_screen() {
        let app = VirtualApp::new();
        let mut events = app.subscribe();

        app.track_screen("home");
        assert_eq!(app.current_screen().as_deref(), Some("home"));
        assert_eq!(
            events.recv().await.unwrap(),
            ActivityEvent::ScreenTracked {
                name: "home".to_string()
            }
        );

        // Backgrounding leaves no screen on display.
        app.background();
        assert!(app.current_screen().is_none());
    }

    #[tokio::test]
    async fn should_track_region_membership() {
        let app = VirtualApp::new();

        app.enter_region("store-42");
        assert_eq!(app.current_region().as_deref(), Some("store-42"));

        // Leaving a different region does not clear the current one.
        app.exit_region("store-7");
        assert_eq!(app.current_region().as_deref(), Some("store-42"));

        app.exit_region("store-42");
        assert!(app.current_region().is_none());
    }

    #[tokio::test]
    async fn should_emit_custom_events_with_value() {
        let app = VirtualApp::new();
        let mut events = app.subscribe();

        app.track_event(serde_json::json!({"name": "purchase"}), Some(12.5));
        assert_eq!(
            events.recv().await.unwrap(),
            ActivityEvent::CustomEvent {
                payload: serde_json::json!({"name": "purchase"}),
                value: Some(12.5),
            }
        );
    }

    #[test]
    fn should_report_version_change_when_set() {
        let app = VirtualApp::new();
        assert!(app.version_changed().is_none());

        app.set_version_changed(serde_json::json!({"version": "2.0.0"}));
        assert_eq!(
            app.version_changed(),
            Some(serde_json::json!({"version": "2.0.0"}))
        );
    }
}
