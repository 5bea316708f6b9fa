//! The hub actor: one task that owns the decoder, reconciler, history
//! recorder and macros engine, and processes [`HubCommand`]s strictly in
//! arrival order.
//!
//! Ingesting a message runs to completion without awaiting:
//!
//! 1. decode the topic into a fragment (or skip it)
//! 2. publish `HARDWARE_DEVICE_APPEARED`
//! 3. merge the fragment into the canonical world, buffering history
//! 4. offer the update to every macro
//! 5. publish `HD_APPEARED` with the touched controls
//! 6. publish each requested command as `WB_PUBLISH_MESSAGE`
//!
//! Persistence runs in background tasks started from step 3 or from the
//! idle tick; [`HubHandle::shutdown`] waits for all of it.

use std::collections::BTreeSet;
use std::ops::ControlFlow;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

use wbhub_domain::device::{Control, Device, Markup};
use wbhub_domain::error::{HubError, UnexpectedBehaviorError};
use wbhub_domain::event::{Event, OutboundMessage};
use wbhub_domain::id::{ControlKey, MacrosId};
use wbhub_domain::macros::MacrosConfig;
use wbhub_domain::time::{self, Timestamp};

use crate::config::EngineConfig;
use crate::decoder::Decoder;
use crate::history_recorder::HistoryRecorder;
use crate::macros::{MacrosInput, MacrosRegistry};
use crate::macros_engine::MacrosEngine;
use crate::ports::{EventPublisher, HardwareRepository, HistoryRepository, MacrosRepository};
use crate::reconciler::{DeviceReconciler, Diff};

type Reply<T> = oneshot::Sender<Result<T, HubError>>;

/// Requests processed by the hub task.
#[derive(Debug)]
pub enum HubCommand {
    Ingest {
        topic: String,
        payload: Vec<u8>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<Device>>,
    },
    SetupMacros {
        config: MacrosConfig,
        reply: Reply<MacrosConfig>,
    },
    DestroyMacros {
        id: MacrosId,
        reply: Reply<MacrosConfig>,
    },
    SetMacrosState {
        id: MacrosId,
        state: serde_json::Value,
        reply: Reply<MacrosConfig>,
    },
    ListMacros {
        reply: oneshot::Sender<Vec<MacrosConfig>>,
    },
    SetDeviceMarkup {
        device_id: String,
        markup: Markup,
        labels: BTreeSet<String>,
        reply: Reply<Device>,
    },
    SetControlMarkup {
        key: ControlKey,
        markup: Markup,
        labels: BTreeSet<String>,
        reply: Reply<Control>,
    },
    Health {
        reply: oneshot::Sender<HubHealth>,
    },
    /// Drain every pending write, then stop.
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Liveness summary of a hub.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HubHealth {
    pub running: bool,
    pub last_message_at: Option<Timestamp>,
    pub devices: usize,
    pub controls: usize,
    pub macros: usize,
}

/// Engine state before it is moved into its task.
pub struct Hub<HR, HiR, MR, P> {
    config: EngineConfig,
    decoder: Decoder,
    reconciler: DeviceReconciler<HR, HiR>,
    macros: MacrosEngine<MR>,
    publisher: P,
    last_message_at: Option<Timestamp>,
}

impl<HR, HiR, MR, P> Hub<HR, HiR, MR, P>
where
    HR: HardwareRepository + Send + Sync + 'static,
    HiR: HistoryRepository + Send + Sync + 'static,
    MR: MacrosRepository + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    pub fn new(
        config: EngineConfig,
        hardware_repo: Arc<HR>,
        history_repo: Arc<HiR>,
        macros_repo: Arc<MR>,
        registry: MacrosRegistry,
        publisher: P,
    ) -> Self {
        let history = HistoryRecorder::new(
            history_repo,
            config.history_heartbeat(),
            config.history_flush_interval(),
        )
        .with_retry_limit(config.history_retry_limit);
        Self {
            decoder: Decoder::from_config(&config),
            reconciler: DeviceReconciler::new(hardware_repo, history, config.device_save_interval()),
            macros: MacrosEngine::new(macros_repo, registry),
            publisher,
            last_message_at: None,
            config,
        }
    }

    /// Load canonical state, replay it through the persisted macros and
    /// spawn the hub task.
    ///
    /// # Errors
    ///
    /// Returns a storage error if canonical state or macros cannot be loaded.
    pub async fn start(mut self) -> Result<HubHandle, HubError> {
        self.bootstrap().await?;
        let (sender, receiver) = mpsc::channel(self.config.command_queue_capacity.max(1));
        tokio::spawn(self.run(receiver));
        Ok(HubHandle { sender })
    }

    #[tracing::instrument(skip_all)]
    async fn bootstrap(&mut self) -> Result<(), HubError> {
        let world = self.reconciler.ensure_loaded().await?;
        let commands = self.macros.start(world).await?;
        self.publish_commands(commands);
        Ok(())
    }

    async fn run(mut self, mut receiver: mpsc::Receiver<HubCommand>) {
        let mut tick = tokio::time::interval(self.config.tick_interval());
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tick.tick().await;
        tracing::info!(namespace = %self.config.namespace, "hub started");

        loop {
            tokio::select! {
                biased;
                command = receiver.recv() => match command {
                    Some(command) => {
                        if self.handle(command).await.is_break() {
                            break;
                        }
                    }
                    None => {
                        self.drain().await;
                        break;
                    }
                },
                _ = tick.tick() => self.reconciler.maybe_flush(Instant::now()),
            }
        }
        tracing::info!("hub stopped");
    }

    async fn handle(&mut self, command: HubCommand) -> ControlFlow<()> {
        match command {
            HubCommand::Ingest { topic, payload } => {
                self.ingest(&topic, &payload);
            }
            HubCommand::Snapshot { reply } => {
                let _ = reply.send(self.reconciler.snapshot());
            }
            HubCommand::SetupMacros { config, reply } => {
                let result = self
                    .macros
                    .setup(self.reconciler.world(), config, true)
                    .await;
                let _ = reply.send(result);
            }
            HubCommand::DestroyMacros { id, reply } => {
                let _ = reply.send(self.macros.destroy(id).await);
            }
            HubCommand::SetMacrosState { id, state, reply } => {
                let _ = reply.send(self.macros.set_state(id, state).await);
            }
            HubCommand::ListMacros { reply } => {
                let _ = reply.send(self.macros.list());
            }
            HubCommand::SetDeviceMarkup {
                device_id,
                markup,
                labels,
                reply,
            } => {
                let result = self.reconciler.set_device_markup(&device_id, markup, labels);
                let _ = reply.send(result);
            }
            HubCommand::SetControlMarkup {
                key,
                markup,
                labels,
                reply,
            } => {
                let _ = reply.send(self.reconciler.set_control_markup(&key, markup, labels));
            }
            HubCommand::Health { reply } => {
                let _ = reply.send(self.health());
            }
            HubCommand::Shutdown { reply } => {
                self.drain().await;
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Run one message through the pipeline.
    fn ingest(&mut self, topic: &str, payload: &[u8]) {
        self.last_message_at = Some(time::now());
        let Some(fragment) = self.decoder.decode(topic, payload) else {
            return;
        };
        self.emit(Event::HardwareDeviceAppeared(fragment.device.clone()));

        let diff = self.reconciler.apply(&fragment.device, false);
        let commands = self.macros.accept(&MacrosInput {
            world: diff.world,
            previous: &diff.previous,
            device: &diff.current,
        });
        let Diff { current, .. } = diff;

        self.emit(Event::HdAppeared(current));
        self.publish_commands(commands);
    }

    fn publish_commands(&self, commands: Vec<OutboundMessage>) {
        for command in commands {
            tracing::debug!(topic = %command.topic, payload = %command.payload, "publishing command");
            self.emit(Event::WbPublishMessage(command));
        }
    }

    fn emit(&self, event: Event) {
        let kind = event.kind();
        if let Err(err) = self.publisher.publish(event) {
            tracing::warn!(event = %kind, error = %err, "failed to publish event");
        }
    }

    fn health(&self) -> HubHealth {
        let world = self.reconciler.world();
        HubHealth {
            running: true,
            last_message_at: self.last_message_at,
            devices: world.devices().len(),
            controls: world.controls().len(),
            macros: self.macros.len(),
        }
    }

    async fn drain(&mut self) {
        tracing::info!("draining pending writes");
        self.macros.save_states().await;
        self.reconciler.drain().await;
    }
}

/// Cloneable client of a running hub.
#[derive(Debug, Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Queue one raw wire message.
    ///
    /// # Errors
    ///
    /// Returns [`UnexpectedBehaviorError::HubStopped`] once the hub is gone.
    pub async fn ingest(
        &self,
        topic: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Result<(), HubError> {
        self.send(HubCommand::Ingest {
            topic: topic.into(),
            payload: payload.into(),
        })
        .await
    }

    /// Every canonical device with its full control list.
    ///
    /// # Errors
    ///
    /// Returns [`UnexpectedBehaviorError::HubStopped`] once the hub is gone.
    pub async fn snapshot(&self) -> Result<Vec<Device>, HubError> {
        self.request(|reply| HubCommand::Snapshot { reply }).await
    }

    /// Register and persist a macro.
    ///
    /// # Errors
    ///
    /// See [`MacrosEngine::setup`].
    pub async fn setup_macros(&self, config: MacrosConfig) -> Result<MacrosConfig, HubError> {
        self.request(|reply| HubCommand::SetupMacros { config, reply })
            .await?
    }

    /// Unregister a macro and delete its row.
    ///
    /// # Errors
    ///
    /// See [`MacrosEngine::destroy`].
    pub async fn destroy_macros(&self, id: MacrosId) -> Result<MacrosConfig, HubError> {
        self.request(|reply| HubCommand::DestroyMacros { id, reply })
            .await?
    }

    /// Replace a macro's state.
    ///
    /// # Errors
    ///
    /// See [`MacrosEngine::set_state`].
    pub async fn set_macros_state(
        &self,
        id: MacrosId,
        state: serde_json::Value,
    ) -> Result<MacrosConfig, HubError> {
        self.request(|reply| HubCommand::SetMacrosState { id, state, reply })
            .await?
    }

    /// # Errors
    ///
    /// Returns [`UnexpectedBehaviorError::HubStopped`] once the hub is gone.
    pub async fn list_macros(&self) -> Result<Vec<MacrosConfig>, HubError> {
        self.request(|reply| HubCommand::ListMacros { reply }).await
    }

    /// # Errors
    ///
    /// Returns an invalid-arguments error for an unknown device.
    pub async fn set_device_markup(
        &self,
        device_id: impl Into<String>,
        markup: Markup,
        labels: BTreeSet<String>,
    ) -> Result<Device, HubError> {
        let device_id = device_id.into();
        self.request(|reply| HubCommand::SetDeviceMarkup {
            device_id,
            markup,
            labels,
            reply,
        })
        .await?
    }

    /// # Errors
    ///
    /// Returns an invalid-arguments error for an unknown control.
    pub async fn set_control_markup(
        &self,
        key: ControlKey,
        markup: Markup,
        labels: BTreeSet<String>,
    ) -> Result<Control, HubError> {
        self.request(|reply| HubCommand::SetControlMarkup {
            key,
            markup,
            labels,
            reply,
        })
        .await?
    }

    /// Liveness summary; reports `running: false` once the hub is gone.
    pub async fn health(&self) -> HubHealth {
        self.request(|reply| HubCommand::Health { reply })
            .await
            .unwrap_or_default()
    }

    /// Drain pending writes and stop the hub.
    ///
    /// # Errors
    ///
    /// Returns [`UnexpectedBehaviorError::HubStopped`] if the hub was
    /// already gone.
    pub async fn shutdown(&self) -> Result<(), HubError> {
        self.request(|reply| HubCommand::Shutdown { reply }).await
    }

    async fn send(&self, command: HubCommand) -> Result<(), HubError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| UnexpectedBehaviorError::HubStopped.into())
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> HubCommand,
    ) -> Result<T, HubError> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply)).await?;
        response
            .await
            .map_err(|_| UnexpectedBehaviorError::HubStopped.into())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use wbhub_domain::event::EventKind;
    use wbhub_domain::hardware::{ControlType, Title};

    use super::*;
    use crate::testing::{
        InMemoryHardwareRepo, InMemoryHistoryRepo, InMemoryMacrosRepo, SpyPublisher,
    };

    struct Fixture {
        hardware: Arc<InMemoryHardwareRepo>,
        history: Arc<InMemoryHistoryRepo>,
        macros: Arc<InMemoryMacrosRepo>,
        publisher: Arc<SpyPublisher>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                hardware: Arc::default(),
                history: Arc::default(),
                macros: Arc::default(),
                publisher: Arc::default(),
            }
        }

        async fn start(&self) -> HubHandle {
            Hub::new(
                EngineConfig::default(),
                Arc::clone(&self.hardware),
                Arc::clone(&self.history),
                Arc::clone(&self.macros),
                MacrosRegistry::default(),
                Arc::clone(&self.publisher),
            )
            .start()
            .await
            .unwrap()
        }
    }

    async fn relay_scenario(handle: &HubHandle) {
        handle
            .ingest(
                "/devices/wb-mr6cu_21/meta",
                r#"{"driver":"wb-mr6cu","title":{"ru":"Реле"}}"#,
            )
            .await
            .unwrap();
        handle
            .ingest(
                "/devices/wb-mr6cu_21/controls/K1/meta",
                r#"{"readonly":false,"type":"switch"}"#,
            )
            .await
            .unwrap();
        handle
            .ingest("/devices/wb-mr6cu_21/controls/K1", "1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn should_build_canonical_device_from_fragments() {
        let f = Fixture::new();
        let handle = f.start().await;

        relay_scenario(&handle).await;
        let devices = handle.snapshot().await.unwrap();

        assert_eq!(devices.len(), 1);
        let device = &devices[0];
        assert_eq!(device.id, "wb-mr6cu_21");
        assert_eq!(device.driver, "wb-mr6cu");
        assert_eq!(device.title, Title::ru("Реле"));
        assert_eq!(device.controls.len(), 1);
        let k1 = &device.controls[0];
        assert!(!k1.readonly);
        assert_eq!(k1.kind, ControlType::Switch);
        assert_eq!(k1.value, "1");
        assert_eq!(k1.topic, "/devices/wb-mr6cu_21/controls/K1/on");

        handle.shutdown().await.unwrap();
        let rows = f.history.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].control_id, "K1");
    }

    #[tokio::test]
    async fn should_publish_fragment_then_canonical_update() {
        let f = Fixture::new();
        let handle = f.start().await;

        handle
            .ingest("/devices/wb-mr6cu_21/controls/K1", "0")
            .await
            .unwrap();
        handle.snapshot().await.unwrap();

        let kinds: Vec<_> = f.publisher.events().iter().map(Event::kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::HardwareDeviceAppeared, EventKind::HdAppeared]
        );
    }

    #[tokio::test]
    async fn should_survive_malformed_and_skipped_messages() {
        let f = Fixture::new();
        let handle = f.start().await;

        handle.ingest("/devices/wb-mr6cu_21/meta", "{oops").await.unwrap();
        handle.ingest("/devices/hwmon/controls/CPU", "40").await.unwrap();
        handle
            .ingest("/devices/wb-mr6cu_21/controls/K1", "1")
            .await
            .unwrap();

        let health = handle.health().await;
        assert!(health.running);
        assert!(health.last_message_at.is_some());
        assert_eq!(health.devices, 1);
        assert_eq!(health.controls, 1);
    }

    #[tokio::test]
    async fn should_refuse_macros_before_any_device_is_known() {
        let f = Fixture::new();
        let handle = f.start().await;
        let config = MacrosConfig::builder().kind("LIGHTING").build().unwrap();

        let result = handle.setup_macros(config).await;

        assert!(result.unwrap_err().is_invalid_arguments());
    }

    #[tokio::test]
    async fn should_publish_commands_when_lighting_button_pressed() {
        let f = Fixture::new();
        let handle = f.start().await;
        relay_scenario(&handle).await;
        handle
            .ingest("/devices/wb-gpio/controls/A1", "0")
            .await
            .unwrap();

        let config = MacrosConfig::builder()
            .kind("LIGHTING")
            .name("Hall")
            .settings(serde_json::json!({
                "buttons": [{ "control": "wb-gpio/A1" }],
                "lightings": ["wb-mr6cu_21/K1"],
            }))
            .build()
            .unwrap();
        let config = handle.setup_macros(config).await.unwrap();
        assert!(f.macros.get(config.id).is_some());

        handle
            .ingest("/devices/wb-gpio/controls/A1", "1")
            .await
            .unwrap();
        let listed = handle.list_macros().await.unwrap();

        assert_eq!(
            f.publisher.commands(),
            vec![OutboundMessage::new(
                "/devices/wb-mr6cu_21/controls/K1/on",
                "1"
            )]
        );
        assert_eq!(listed[0].state["switch"], "ON");

        let removed = handle.destroy_macros(config.id).await.unwrap();
        assert_eq!(removed.id, config.id);
        assert!(handle.list_macros().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_not_command_lighting_that_became_readonly() {
        let f = Fixture::new();
        let handle = f.start().await;
        relay_scenario(&handle).await;
        handle
            .ingest("/devices/wb-gpio/controls/A1", "0")
            .await
            .unwrap();
        let config = MacrosConfig::builder()
            .kind("LIGHTING")
            .settings(serde_json::json!({
                "buttons": [{ "control": "wb-gpio/A1" }],
                "lightings": ["wb-mr6cu_21/K1"],
            }))
            .build()
            .unwrap();
        handle.setup_macros(config).await.unwrap();

        handle
            .ingest(
                "/devices/wb-mr6cu_21/controls/K1/meta",
                r#"{"readonly":true,"type":"switch"}"#,
            )
            .await
            .unwrap();
        handle
            .ingest("/devices/wb-gpio/controls/A1", "1")
            .await
            .unwrap();
        let devices = handle.snapshot().await.unwrap();

        let k1 = devices
            .iter()
            .flat_map(|device| &device.controls)
            .find(|control| control.id == "K1")
            .unwrap();
        assert!(k1.readonly);
        assert!(!k1.topic.is_empty());
        assert!(f.publisher.commands().is_empty());
    }

    #[tokio::test]
    async fn should_replay_persisted_state_into_persisted_macros_on_start() {
        let f = Fixture::new();
        let handle = f.start().await;
        relay_scenario(&handle).await;
        handle.shutdown().await.unwrap();

        let config = MacrosConfig::builder()
            .kind("LIGHTING")
            .settings(serde_json::json!({ "lightings": ["wb-mr6cu_21/K1"] }))
            .build()
            .unwrap();
        f.macros.store.lock().unwrap().insert(config.id, config.clone());

        let handle = f.start().await;
        let listed = handle.list_macros().await.unwrap();
        let health = handle.health().await;

        assert_eq!(health.devices, 1);
        assert_eq!(health.macros, 1);
        assert_eq!(listed[0].state["switch"], "ON");
    }

    #[tokio::test]
    async fn should_update_markup_through_handle() {
        let f = Fixture::new();
        let handle = f.start().await;
        relay_scenario(&handle).await;

        let markup = Markup {
            title: "Relay block".to_string(),
            ..Markup::default()
        };
        let device = handle
            .set_device_markup("wb-mr6cu_21", markup, BTreeSet::from(["hall".to_string()]))
            .await
            .unwrap();
        let missing = handle
            .set_control_markup(
                ControlKey::new("wb-mr6cu_21", "K9"),
                Markup::default(),
                BTreeSet::new(),
            )
            .await;

        assert_eq!(device.markup.title, "Relay block");
        assert!(missing.unwrap_err().is_invalid_arguments());
    }

    #[tokio::test]
    async fn should_report_stopped_after_shutdown() {
        let f = Fixture::new();
        let handle = f.start().await;

        handle.shutdown().await.unwrap();

        assert!(!handle.health().await.running);
        assert!(matches!(
            handle.ingest("/devices/wb-gpio/controls/A1", "1").await,
            Err(HubError::UnexpectedBehavior(
                UnexpectedBehaviorError::HubStopped
            ))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn should_flush_devices_on_idle_tick() {
        let f = Fixture::new();
        let handle = f.start().await;
        handle
            .ingest("/devices/wb-mr6cu_21/controls/K1", "1")
            .await
            .unwrap();
        handle.snapshot().await.unwrap();
        assert_eq!(f.hardware.upserts.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(61)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(f.hardware.upserts.load(Ordering::SeqCst), 1);
        handle.shutdown().await.unwrap();
    }
}
