//! Activity port — application lifecycle and analytics signals.

use cadence_domain::event::ActivityEvent;
use tokio::sync::broadcast;

/// Source of application activity: lifecycle transitions, screen views,
/// region crossings and custom events, plus point-in-time queries used when
/// checking execution conditions.
pub trait ActivityObserver: Send + Sync + 'static {
    /// Whether the application is currently in the foreground.
    fn is_foregrounded(&self) -> bool;

    /// Name of the screen currently being tracked, if any.
    fn current_screen(&self) -> Option<String>;

    /// Identifier of the region the device is currently inside, if any.
    fn current_region(&self) -> Option<String>;

    /// When the application version changed since the previous run,
    /// the version payload to feed version triggers with.
    fn version_changed(&self) -> Option<serde_json::Value>;

    /// Subscribe to the live activity feed.
    fn subscribe(&self) -> broadcast::Receiver<ActivityEvent>;
}

impl<T: ActivityObserver> ActivityObserver for std::sync::Arc<T> {
    fn is_foregrounded(&self) -> bool {
        (**self).is_foregrounded()
    }

    fn current_screen(&self) -> Option<String> {
        (**self).current_screen()
    }

    fn current_region(&self) -> Option<String> {
        (**self).current_region()
    }

    fn version_changed(&self) -> Option<serde_json::Value> {
        (**self).version_changed()
    }

    fn subscribe(&self) -> broadcast::Receiver<ActivityEvent> {
        (**self).subscribe()
    }
}
