//! # cadence-domain
//!
//! Pure domain model for the cadence in-app automation engine.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Schedules** (automation rules with limits, delays, and intervals)
//! - Define **Triggers** (goal accumulators armed by events or continuous state)
//! - Define **Events** (activity and analytics occurrences that feed triggers)
//! - Define the **execution state machine** and its guarded transitions
//! - Contain all invariant enforcement and domain logic
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod event;
pub mod schedule;
pub mod trigger;
