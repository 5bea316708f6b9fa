//! Event bus port: publish side of the in-process pub/sub channel.

use wbhub_domain::error::HubError;
use wbhub_domain::event::Event;

/// Publishes hub events to interested subscribers.
///
/// Publishing is synchronous: the ingestion pipeline emits events in the
/// middle of processing one message and must not suspend there.
pub trait EventPublisher {
    /// Publish an event to all current subscribers.
    ///
    /// # Errors
    ///
    /// Implementations return [`HubError`] only when the event could not be
    /// handed over at all; having no subscribers is not an error.
    fn publish(&self, event: Event) -> Result<(), HubError>;
}

impl<T: EventPublisher + ?Sized> EventPublisher for std::sync::Arc<T> {
    fn publish(&self, event: Event) -> Result<(), HubError> {
        (**self).publish(event)
    }
}
