//! MQTT adapter error types.

use wbhub_domain::error::HubError;

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The bridge was started twice.
    #[error("MQTT bridge already running")]
    AlreadyRunning,

    /// The rumqttc client returned an error.
    #[error("MQTT client error")]
    Client(#[from] rumqttc::ClientError),

    /// A hub-level error surfaced while forwarding a message.
    #[error("hub error")]
    Hub(#[source] HubError),
}

impl MqttError {
    /// Convert into a [`HubError`] for propagation across port boundaries.
    #[must_use]
    pub fn into_domain(self) -> HubError {
        match self {
            Self::Hub(err) => err,
            other => HubError::storage(other),
        }
    }
}

impl From<MqttError> for HubError {
    fn from(err: MqttError) -> Self {
        err.into_domain()
    }
}
