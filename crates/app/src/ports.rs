//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside
//! world. They are defined here (in `app`) so that both the orchestrator
//! and the adapter layer can depend on them without creating circular
//! dependencies.

pub mod activity;
pub mod clock;
pub mod driver;
pub mod store;

pub use activity::ActivityObserver;
pub use clock::{DelayScheduler, TokioDelayScheduler};
pub use driver::{Driver, PrepareResult};
pub use store::ScheduleStore;
