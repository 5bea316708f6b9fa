//! Macros: pluggable automation rules keyed by a `type` discriminant.
//!
//! Each kind registers one constructor in a [`MacrosRegistry`]; adding a
//! kind is adding one table entry.

pub mod lighting;

use std::collections::BTreeMap;

use wbhub_domain::device::{Control, Device};
use wbhub_domain::error::{HubError, InvalidArgumentsError};
use wbhub_domain::event::OutboundMessage;
use wbhub_domain::id::ControlKey;
use wbhub_domain::macros::MacrosConfig;

use crate::reconciler::World;

/// What a macro sees for one canonical device update.
#[derive(Debug, Clone, Copy)]
pub struct MacrosInput<'a> {
    /// The whole canonical world, after the update.
    pub world: &'a World,
    /// Touched controls as they were before the update.
    pub previous: &'a BTreeMap<ControlKey, Control>,
    /// The updated device.
    pub device: &'a Device,
}

impl MacrosInput<'_> {
    /// Whether `key` is on the updated device and its value moved away from
    /// a previously known one. A first sighting is not a change.
    #[must_use]
    pub fn value_changed(&self, key: &ControlKey) -> bool {
        let Some(current) = self.current(key) else {
            return false;
        };
        self.previous
            .get(key)
            .is_some_and(|previous| previous.value != current.value)
    }

    /// The updated control for `key`, when it belongs to this update.
    #[must_use]
    pub fn current(&self, key: &ControlKey) -> Option<&Control> {
        if key.device_id() != self.device.id {
            return None;
        }
        self.device.control(key.control_id())
    }
}

/// A running automation rule.
pub trait Macros: Send {
    fn config(&self) -> &MacrosConfig;

    /// React to a canonical device update, returning commands to publish.
    ///
    /// Must not block; an irrelevant update returns no commands.
    fn accept(&mut self, input: &MacrosInput<'_>) -> Vec<OutboundMessage>;

    /// Replace the macro's state.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgumentsError::InvalidSettings`] when the state does
    /// not fit this kind of macro.
    fn set_state(&mut self, state: serde_json::Value) -> Result<(), HubError>;
}

/// Builds a macro from its persisted configuration.
pub type MacrosConstructor = fn(MacrosConfig) -> Result<Box<dyn Macros>, HubError>;

/// Lookup table from `type` discriminant to constructor.
#[derive(Clone)]
pub struct MacrosRegistry {
    constructors: BTreeMap<&'static str, MacrosConstructor>,
}

impl MacrosRegistry {
    /// A registry that knows no kinds.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, kind: &'static str, constructor: MacrosConstructor) -> Self {
        self.constructors.insert(kind, constructor);
        self
    }

    /// Instantiate the macro described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgumentsError::UnknownMacrosType`] when no
    /// constructor is registered for `config.kind`, or whatever the
    /// constructor rejects.
    pub fn build(&self, config: MacrosConfig) -> Result<Box<dyn Macros>, HubError> {
        let constructor = self
            .constructors
            .get(config.kind.as_str())
            .ok_or_else(|| InvalidArgumentsError::UnknownMacrosType(config.kind.clone()))?;
        constructor(config)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constructors.keys().copied()
    }
}

impl Default for MacrosRegistry {
    fn default() -> Self {
        Self::empty().with(lighting::KIND, lighting::Lighting::build)
    }
}

impl std::fmt::Debug for MacrosRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.kinds()).finish()
    }
}
