//! # wbhub-adapter-mqtt
//!
//! MQTT adapter: bridges the Wirenboard broker and the wbhub engine.
//!
//! ## Responsibilities
//! - Connect to an MQTT broker (re-subscribing after every reconnect)
//! - Subscribe to `<namespace>/#` and forward every publish to the hub as a
//!   raw `(topic, payload)` pair
//! - Publish `WB_PUBLISH_MESSAGE` events from the bus back to the broker
//!
//! Decoding is left to the hub: the bridge never looks inside a payload.
//!
//! ## Dependency rule
//! Same as other adapters: depends on `wbhub-app` and `wbhub-domain`.

pub mod config;
pub mod error;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use wbhub_app::event_bus::Subscription;
use wbhub_app::hub::HubHandle;
use wbhub_domain::event;

pub use config::MqttConfig;
pub use error::MqttError;

/// Subscription filter covering every topic under `namespace`.
#[must_use]
pub fn topic_filter(namespace: &str) -> String {
    format!("{}/#", namespace.trim_end_matches('/'))
}

/// Two background tasks: broker → hub ingestion and bus → broker commands.
pub struct MqttBridge {
    config: MqttConfig,
    filter: String,
    tasks: Vec<JoinHandle<()>>,
}

impl MqttBridge {
    #[must_use]
    pub fn new(config: MqttConfig, namespace: &str) -> Self {
        Self {
            config,
            filter: topic_filter(namespace),
            tasks: Vec::new(),
        }
    }

    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|task| !task.is_finished())
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.broker_host.clone(),
            self.config.broker_port,
        );
        options.set_keep_alive(self.config.keep_alive());
        if let Some(username) = &self.config.username {
            options.set_credentials(
                username.clone(),
                self.config.password.clone().unwrap_or_default(),
            );
        }
        options
    }

    /// Spawn the ingestion and command tasks.
    ///
    /// `commands` should be a [`Subscription`] to `WB_PUBLISH_MESSAGE`.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError::AlreadyRunning`] if the bridge is already started.
    pub fn start(&mut self, hub: HubHandle, commands: Subscription) -> Result<(), MqttError> {
        if self.is_running() {
            return Err(MqttError::AlreadyRunning);
        }
        self.tasks.clear();

        let (client, eventloop) = AsyncClient::new(self.options(), self.config.channel_capacity);
        tracing::info!(
            host = %self.config.broker_host,
            port = self.config.broker_port,
            filter = %self.filter,
            "starting MQTT bridge"
        );

        let ingest = Ingest {
            client: client.clone(),
            filter: self.filter.clone(),
            reconnect_delay: self.config.reconnect_delay(),
            hub,
        };
        self.tasks.push(tokio::spawn(async move {
            if let Err(err) = ingest.run(eventloop).await {
                tracing::warn!(error = %err, "MQTT ingestion stopped");
            }
        }));
        self.tasks
            .push(tokio::spawn(forward_commands(client, commands)));
        Ok(())
    }

    /// Abort both tasks and wait for them to finish.
    pub async fn stop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        tracing::info!("MQTT bridge stopped");
    }
}

struct Ingest {
    client: AsyncClient,
    filter: String,
    reconnect_delay: std::time::Duration,
    hub: HubHandle,
}

impl Ingest {
    async fn run(self, mut eventloop: EventLoop) -> Result<(), MqttError> {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    tracing::info!(filter = %self.filter, "connected to MQTT broker");
                    // this loop drains the request channel, awaiting here would deadlock
                    self.client.try_subscribe(self.filter.as_str(), QoS::AtLeastOnce)?;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.hub
                        .ingest(publish.topic, publish.payload.to_vec())
                        .await
                        .map_err(MqttError::Hub)?;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "MQTT eventloop error");
                    tokio::time::sleep(self.reconnect_delay).await;
                }
            }
        }
    }
}

async fn forward_commands(client: AsyncClient, mut commands: Subscription) {
    loop {
        match commands.recv().await {
            Ok(event::Event::WbPublishMessage(message)) => {
                tracing::debug!(topic = %message.topic, payload = %message.payload, "publishing command");
                if let Err(err) = client
                    .publish(message.topic, QoS::AtLeastOnce, false, message.payload)
                    .await
                {
                    tracing::warn!(error = %err, "failed to publish command");
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "command subscriber lagged behind");
            }
            Err(RecvError::Closed) => {
                tracing::debug!("event bus closed, stopping command forwarding");
                return;
            }
        }
    }
}
