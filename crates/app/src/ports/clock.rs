//! Clock port — how the engine waits for wall-clock delays and reads time.

use std::future::Future;
use std::time::Duration;

use cadence_domain::time::{self, Timestamp};

/// Time source backing delay and interval alarms and expiry decisions.
///
/// Abstracted so tests can drive time deterministically and so embedders
/// can plug in a scheduler that survives process restarts. `now` and
/// `sleep` must move together: after a `sleep(d)` resolves, `now` has
/// advanced by at least `d`.
pub trait DelayScheduler: Send + Sync + 'static {
    fn now(&self) -> Timestamp;

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Default scheduler backed by the system clock and the tokio timer wheel.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioDelayScheduler;

impl DelayScheduler for TokioDelayScheduler {
    fn now(&self) -> Timestamp {
        time::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

impl<T: DelayScheduler> DelayScheduler for std::sync::Arc<T> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        (**self).sleep(duration)
    }
}
