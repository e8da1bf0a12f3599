//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts via `#[from]`.
//! Nothing in the engine is fatal to the process: every failure is scoped
//! to the schedule that caused it.

/// Top-level error for the cadence workspace.
#[derive(Debug, thiserror::Error)]
pub enum CadenceError {
    /// A domain invariant was violated.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(#[from] NotFoundError),

    /// The persistent store failed to complete a call.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The execution driver failed to build or run a schedule.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// The engine was asked to do something in an invalid lifecycle state.
    #[error("engine error: {0}")]
    Engine(String),
}

/// Domain invariant violations.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A trigger goal must be strictly positive.
    #[error("trigger goal must be greater than zero")]
    NonPositiveGoal,

    /// A schedule needs at least one standard trigger to ever fire.
    #[error("schedule requires at least one trigger")]
    NoTriggers,

    /// The end of the schedule window precedes its start.
    #[error("schedule end precedes start")]
    EndBeforeStart,

    /// The engine schedule limit must be strictly positive.
    #[error("schedule limit must be greater than zero")]
    NonPositiveLimit,

    /// The condition-check timeout must be strictly positive.
    #[error("condition timeout must be greater than zero")]
    NonPositiveTimeout,
}

/// A referenced record does not exist.
#[derive(Debug, thiserror::Error)]
#[error("{kind} not found: {id}")]
pub struct NotFoundError {
    /// Kind of record, e.g. `"Schedule"`.
    pub kind: &'static str,
    /// Identifier that failed to resolve.
    pub id: String,
}

/// A persistence call failed.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct StorageError(pub String);

/// A driver call failed.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct DriverError(pub String);
