//! Events — discrete occurrences that feed trigger accounting.
//!
//! Activity events are produced by the host application (foreground and
//! background changes, screen views, region crossings, custom analytics
//! events) and are folded into trigger progress by the engine.

use serde::{Deserialize, Serialize};

use crate::trigger::TriggerType;

/// A discrete occurrence observed by the host application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityEvent {
    /// The app moved to the foreground.
    Foreground,
    /// The app moved to the background.
    Background,
    /// A screen was displayed.
    ScreenTracked { name: String },
    /// The device entered a geographic region.
    RegionEnter {
        region_id: String,
        payload: serde_json::Value,
    },
    /// The device exited a geographic region.
    RegionExit {
        region_id: String,
        payload: serde_json::Value,
    },
    /// A custom analytics event, optionally carrying a numeric value.
    CustomEvent {
        payload: serde_json::Value,
        value: Option<f64>,
    },
}

impl ActivityEvent {
    /// The trigger type this event increments, with its payload.
    ///
    /// Custom events additionally increment value triggers; see
    /// [`ActivityEvent::value_update`].
    #[must_use]
    pub fn trigger_update(&self) -> (TriggerType, serde_json::Value) {
        match self {
            Self::Foreground => (TriggerType::Foreground, serde_json::Value::Null),
            Self::Background => (TriggerType::Background, serde_json::Value::Null),
            Self::ScreenTracked { name } => {
                (TriggerType::ScreenView, serde_json::Value::String(name.clone()))
            }
            Self::RegionEnter { payload, .. } => (TriggerType::RegionEnter, payload.clone()),
            Self::RegionExit { payload, .. } => (TriggerType::RegionExit, payload.clone()),
            Self::CustomEvent { payload, .. } => {
                (TriggerType::CustomEventCount, payload.clone())
            }
        }
    }

    /// For custom events with a value, the additional value-trigger update.
    #[must_use]
    pub fn value_update(&self) -> Option<(TriggerType, serde_json::Value, f64)> {
        match self {
            Self::CustomEvent {
                payload,
                value: Some(value),
            } => Some((TriggerType::CustomEventValue, payload.clone(), *value)),
            _ => None,
        }
    }

    /// Whether this event can change schedule execution conditions
    /// (app state, current screen, current region).
    #[must_use]
    pub fn changes_conditions(&self) -> bool {
        !matches!(self, Self::CustomEvent { .. })
    }
}
