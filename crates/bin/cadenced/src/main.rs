//! # cadenced — cadence demo daemon
//!
//! Composition root that wires the in-memory store, the announcement
//! driver, and the virtual host application into a running engine, then
//! plays through a scripted user session to show the automation pipeline
//! end to end.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Construct adapter implementations
//! - Start the engine, injecting adapters via port traits
//! - Register demo schedules and drive a simulated session
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use std::sync::Arc;
use std::time::Duration;

use cadence_adapter_storage_memory::MemoryScheduleStore;
use cadence_adapter_virtual::{AnnouncementDriver, VirtualApp};
use cadence_app::engine::AutomationEngine;
use cadence_app::ports::TokioDelayScheduler;
use cadence_domain::schedule::ScheduleInfo;
use cadence_domain::trigger::{TriggerSpec, TriggerType};
use config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    let store = Arc::new(MemoryScheduleStore::new());
    let driver = Arc::new(AnnouncementDriver::new());
    let app = Arc::new(VirtualApp::new());
    let engine = AutomationEngine::start(
        config.engine_config(),
        store,
        Arc::clone(&driver),
        Arc::clone(&app),
        TokioDelayScheduler,
    )?;

    register_demo_schedules(&engine).await?;
    run_demo_session(&app).await;

    // Let spawned prepare/execute pipelines drain.
    tokio::time::sleep(Duration::from_millis(500)).await;

    for announcement in driver.displayed() {
        tracing::info!(message = %announcement.message, "session displayed");
    }
    engine.stop();
    Ok(())
}

/// The demo campaign: a welcome message on first foreground and a reward
/// once checkout purchases cross a value threshold.
async fn register_demo_schedules(engine: &AutomationEngine) -> anyhow::Result<()> {
    let welcome = ScheduleInfo::builder()
        .group("demo")
        .trigger(TriggerSpec::new(TriggerType::Foreground, 1.0))
        .data(serde_json::json!({"message": "Welcome back!"}))
        .build()?;
    engine.schedule(welcome).await?;

    let reward = ScheduleInfo::builder()
        .group("demo")
        .trigger(TriggerSpec::new(TriggerType::CustomEventValue, 50.0))
        .screen("checkout")
        .data(serde_json::json!({"message": "You earned a reward!"}))
        .build()?;
    engine.schedule(reward).await?;

    Ok(())
}

/// A short scripted session against the virtual app.
async fn run_demo_session(app: &VirtualApp) {
    app.foreground();
    app.track_screen("home");
    app.track_event(serde_json::json!({"name": "purchase"}), Some(30.0));
    app.track_screen("checkout");
    app.track_event(serde_json::json!({"name": "purchase"}), Some(25.0));
    tokio::time::sleep(Duration::from_millis(200)).await;
    app.background();
}
