//! Macros configuration: the persisted description of one automation rule.
//!
//! `kind` is the discriminant (e.g. `"LIGHTING"`) that selects which macros
//! implementation is instantiated; `settings` and `state` are opaque JSON
//! owned by that implementation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{HubError, InvalidArgumentsError};
use crate::id::MacrosId;

/// Persisted configuration of one macros instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacrosConfig {
    pub id: MacrosId,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub description: String,
    pub labels: BTreeSet<String>,
    pub settings: serde_json::Value,
    pub state: serde_json::Value,
}

impl MacrosConfig {
    /// Create a builder for constructing a [`MacrosConfig`].
    #[must_use]
    pub fn builder() -> MacrosConfigBuilder {
        MacrosConfigBuilder::default()
    }

    /// Check that the discriminant is present.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgumentsError::MissingIdentifier`] when `kind` is empty.
    pub fn validate(&self) -> Result<(), HubError> {
        if self.kind.trim().is_empty() {
            return Err(InvalidArgumentsError::MissingIdentifier("type").into());
        }
        Ok(())
    }
}

/// Step-by-step builder for [`MacrosConfig`].
#[derive(Debug, Default)]
pub struct MacrosConfigBuilder {
    id: Option<MacrosId>,
    kind: Option<String>,
    name: Option<String>,
    description: Option<String>,
    labels: BTreeSet<String>,
    settings: Option<serde_json::Value>,
    state: Option<serde_json::Value>,
}

impl MacrosConfigBuilder {
    #[must_use]
    pub fn id(mut self, id: MacrosId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label.into());
        self
    }

    #[must_use]
    pub fn settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = Some(settings);
        self
    }

    #[must_use]
    pub fn state(mut self, state: serde_json::Value) -> Self {
        self.state = Some(state);
        self
    }

    /// Consume the builder, validate, and return a [`MacrosConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgumentsError::MissingIdentifier`] if no type was given.
    pub fn build(self) -> Result<MacrosConfig, HubError> {
        let config = MacrosConfig {
            id: self.id.unwrap_or_default(),
            kind: self.kind.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            labels: self.labels,
            settings: self.settings.unwrap_or_else(|| serde_json::json!({})),
            state: self.state.unwrap_or_else(|| serde_json::json!({})),
        };
        config.validate()?;
        Ok(config)
    }
}
