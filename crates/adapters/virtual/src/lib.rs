//! # cadence-adapter-virtual
//!
//! Virtual/demo implementations of the driver and activity ports:
//!
//! | Component | Port | Behaviour |
//! |-----------|------|-----------|
//! | [`VirtualApp`] | `ActivityObserver` | A scriptable host application: callers drive foreground state, screens, regions and custom events from code |
//! | [`AnnouncementDriver`] | `Driver` | Decodes `{"message": ...}` payloads and "displays" them by logging, recording every execution |
//!
//! ## Dependency rule
//!
//! Depends on `cadence-app` (port traits) and `cadence-domain` only.

mod activity;
mod driver;

pub use activity::VirtualApp;
pub use driver::{Announcement, AnnouncementDriver};
