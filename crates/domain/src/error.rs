//! Common error types used across the workspace.
//!
//! Errors fall into two families: [`InvalidArgumentsError`] for caller or
//! configuration mistakes, and [`UnexpectedBehaviorError`] for failures the
//! caller could not have prevented (storage, malformed payloads). Adapters
//! define their own typed errors and convert into [`HubError`] via `From`.

use crate::id::{ControlKey, MacrosId};

/// Top-level error returned across port and service boundaries.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("invalid arguments")]
    InvalidArguments(#[from] InvalidArgumentsError),

    #[error("unexpected behavior")]
    UnexpectedBehavior(#[from] UnexpectedBehaviorError),
}

impl HubError {
    /// Wrap an adapter-specific storage failure.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        UnexpectedBehaviorError::Storage(Box::new(err)).into()
    }

    /// Whether the caller can fix this by changing its input.
    #[must_use]
    pub fn is_invalid_arguments(&self) -> bool {
        matches!(self, Self::InvalidArguments(_))
    }
}

/// Caller or configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum InvalidArgumentsError {
    #[error("missing identifier: {0}")]
    MissingIdentifier(&'static str),

    #[error("unknown macros type {0:?}")]
    UnknownMacrosType(String),

    #[error("no canonical devices are known yet")]
    EmptyWorld,

    #[error("macros {0} not found")]
    MacrosNotFound(MacrosId),

    #[error("device {0} not found")]
    DeviceNotFound(String),

    #[error("control {0} not found")]
    ControlNotFound(ControlKey),

    #[error("invalid macros settings")]
    InvalidSettings(#[source] serde_json::Error),
}

/// Failures the caller could not have prevented.
#[derive(Debug, thiserror::Error)]
pub enum UnexpectedBehaviorError {
    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("malformed payload on {topic}")]
    MalformedPayload {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("hub is not running")]
    HubStopped,
}
