//! # wbhubd: wbhub daemon
//!
//! Composition root that wires all adapters together and runs the hub.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Initialize the `SQLite` connection pool and run migrations
//! - Construct repository implementations (adapters)
//! - Start the hub, injecting repositories via port traits
//! - Bridge the MQTT broker to the hub and the event bus
//! - Handle graceful shutdown (Ctrl-C), draining pending writes
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

mod config;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use wbhub_adapter_mqtt::MqttBridge;
use wbhub_adapter_storage_sqlite_sqlx::{
    Config as StorageConfig, SqliteHardwareRepository, SqliteHistoryRepository,
    SqliteMacrosRepository,
};
use wbhub_app::event_bus::InProcessEventBus;
use wbhub_app::hub::Hub;
use wbhub_app::macros::MacrosRegistry;
use wbhub_domain::event::EventKind;

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::registry()
        .with(EnvFilter::new(&config.logging.filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Database
    let db = StorageConfig {
        database_url: config.database_url().to_string(),
    }
    .build()
    .await?;
    let pool = db.pool().clone();

    // Repositories
    let hardware_repo = Arc::new(SqliteHardwareRepository::new(pool.clone()));
    let history_repo = Arc::new(SqliteHistoryRepository::new(pool.clone()));
    let macros_repo = Arc::new(SqliteMacrosRepository::new(pool));

    // Event bus, subscribed before start so bootstrap commands reach the broker
    let event_bus = Arc::new(InProcessEventBus::new(config.engine.bus_capacity));
    let commands = event_bus.subscribe_to(EventKind::WbPublishMessage);

    // Hub
    let registry = MacrosRegistry::default();
    tracing::info!(macros = ?registry, "starting hub");
    let hub = Hub::new(
        config.engine.clone(),
        hardware_repo,
        history_repo,
        macros_repo,
        registry,
        Arc::clone(&event_bus),
    )
    .start()
    .await?;

    // MQTT
    let mut bridge = MqttBridge::new(config.mqtt.clone(), &config.engine.namespace);
    bridge.start(hub.clone(), commands)?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");

    bridge.stop().await;
    hub.shutdown().await?;
    db.close().await;

    tracing::info!("wbhubd stopped");
    Ok(())
}
