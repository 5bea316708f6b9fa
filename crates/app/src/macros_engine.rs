//! Macros engine: owns the registered macros and fans device updates out
//! to them in registration order.
//!
//! Lifecycle of one macro: unregistered, then registered by
//! [`setup`](MacrosEngine::setup), then removed by
//! [`destroy`](MacrosEngine::destroy). Removal is terminal.

use std::collections::BTreeMap;
use std::sync::Arc;

use wbhub_domain::error::{HubError, InvalidArgumentsError};
use wbhub_domain::event::OutboundMessage;
use wbhub_domain::id::MacrosId;
use wbhub_domain::macros::MacrosConfig;

use crate::macros::{Macros, MacrosInput, MacrosRegistry};
use crate::ports::MacrosRepository;
use crate::reconciler::World;

/// Registered macros and their persistence.
pub struct MacrosEngine<M> {
    repo: Arc<M>,
    registry: MacrosRegistry,
    macros: Vec<Box<dyn Macros>>,
}

impl<M> MacrosEngine<M>
where
    M: MacrosRepository + Send + Sync,
{
    pub fn new(repo: Arc<M>, registry: MacrosRegistry) -> Self {
        Self {
            repo,
            registry,
            macros: Vec::new(),
        }
    }

    /// Register every persisted macro, then replay each canonical device
    /// through all of them.
    ///
    /// Every macro receives exactly one `accept` per known device before
    /// this returns. Persisted rows of unknown type are skipped.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the configurations cannot be loaded.
    #[tracing::instrument(skip_all)]
    pub async fn start(&mut self, world: &World) -> Result<Vec<OutboundMessage>, HubError> {
        for config in self.repo.get_all().await? {
            let id = config.id;
            match self.registry.build(config) {
                Ok(macros) => self.register(macros),
                Err(err) => {
                    tracing::warn!(macros_id = %id, error = %err, "skipping persisted macros");
                }
            }
        }

        let previous = BTreeMap::new();
        let mut commands = Vec::new();
        for device in world.devices().values() {
            commands.extend(self.accept(&MacrosInput {
                world,
                previous: &previous,
                device,
            }));
        }
        tracing::info!(
            macros = self.macros.len(),
            devices = world.devices().len(),
            "macros engine started"
        );
        Ok(commands)
    }

    /// Offer one canonical device update to every macro, in registration
    /// order, collecting the commands they request.
    pub fn accept(&mut self, input: &MacrosInput<'_>) -> Vec<OutboundMessage> {
        self.macros
            .iter_mut()
            .flat_map(|macros| macros.accept(input))
            .collect()
    }

    /// Build and register a macro. A config whose id is already registered
    /// replaces that macro in place.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgumentsError::EmptyWorld`] before any canonical
    /// state is known, and [`InvalidArgumentsError::UnknownMacrosType`] or
    /// [`InvalidArgumentsError::InvalidSettings`] when the config cannot be
    /// built. Storage errors come from persisting the config.
    #[tracing::instrument(skip(self, world, config), fields(macros_id = %config.id, kind = %config.kind))]
    pub async fn setup(
        &mut self,
        world: &World,
        config: MacrosConfig,
        persist: bool,
    ) -> Result<MacrosConfig, HubError> {
        if world.is_empty() {
            return Err(InvalidArgumentsError::EmptyWorld.into());
        }
        config.validate()?;
        let macros = self.registry.build(config)?;
        let config = macros.config().clone();
        if persist {
            self.repo.upsert(config.clone()).await?;
        }
        self.register(macros);
        tracing::info!("macros registered");
        Ok(config)
    }

    /// Delete a macro's row and unregister it.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgumentsError::MacrosNotFound`] for an unknown id.
    #[tracing::instrument(skip(self))]
    pub async fn destroy(&mut self, id: MacrosId) -> Result<MacrosConfig, HubError> {
        let index = self
            .position(id)
            .ok_or(InvalidArgumentsError::MacrosNotFound(id))?;
        self.repo.delete(id).await?;
        let removed = self.macros.remove(index);
        tracing::info!("macros removed");
        Ok(removed.config().clone())
    }

    /// Replace a macro's state and persist its config.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgumentsError::MacrosNotFound`] for an unknown id
    /// and whatever the macro rejects about `state`.
    #[tracing::instrument(skip(self, state))]
    pub async fn set_state(
        &mut self,
        id: MacrosId,
        state: serde_json::Value,
    ) -> Result<MacrosConfig, HubError> {
        let index = self
            .position(id)
            .ok_or(InvalidArgumentsError::MacrosNotFound(id))?;
        let macros = &mut self.macros[index];
        macros.set_state(state)?;
        let config = macros.config().clone();
        self.repo.upsert(config).await
    }

    /// Persist the current config, including state, of every macro.
    pub async fn save_states(&mut self) {
        for config in self.list() {
            let id = config.id;
            if let Err(err) = self.repo.upsert(config).await {
                tracing::warn!(macros_id = %id, error = %err, "failed to save macros state");
            }
        }
    }

    /// Configs of every registered macro, in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<MacrosConfig> {
        self.macros.iter().map(|m| m.config().clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.macros.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    fn position(&self, id: MacrosId) -> Option<usize> {
        self.macros.iter().position(|m| m.config().id == id)
    }

    fn register(&mut self, macros: Box<dyn Macros>) {
        match self.position(macros.config().id) {
            Some(index) => self.macros[index] = macros,
            None => self.macros.push(macros),
        }
    }
}
