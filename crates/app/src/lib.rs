//! # cadence-app
//!
//! Application layer — the automation orchestrator and **port definitions**
//! (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound
//!   ports):
//!   - `ScheduleStore` — persistence for schedule and trigger records
//!   - `Driver` — prepares and executes triggered schedules
//!   - `ActivityObserver` — foreground state, screen, region, activity events
//!   - `DelayScheduler` — time source and cancelable delayed operations (test-clock seam)
//! - Fold events into trigger progress (`accounting`)
//! - Track outstanding delay/interval timers (`alarms`)
//! - Track compound-trigger update times and replay cutoffs (`compound`)
//! - Run the serialized orchestrator actor (`engine`) that owns every
//!   schedule/trigger mutation and persistence call
//!
//! ## Dependency rule
//! Depends on `cadence-domain` only (plus `tokio` for channels and timers).
//! Never imports adapter crates. Adapters depend on *this* crate, not the
//! reverse.

pub mod accounting;
pub mod alarms;
pub mod compound;
pub mod engine;
pub mod ports;
