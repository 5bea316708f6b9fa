//! In-process event bus with one tokio broadcast channel per event kind.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use wbhub_domain::error::HubError;
use wbhub_domain::event::{Event, EventKind};

use crate::ports::EventPublisher;

/// In-process event bus made of one [`broadcast`] ring per [`EventKind`].
///
/// Channels never share a buffer, so a burst of telemetry on
/// `HD_APPEARED` cannot push `WB_PUBLISH_MESSAGE` commands out of a slow
/// subscriber's backlog. Publishing succeeds even when a channel has no
/// active subscribers (the event is simply dropped). Within a channel every
/// subscriber sees every event in publish order.
pub struct InProcessEventBus {
    fragments: broadcast::Sender<Event>,
    devices: broadcast::Sender<Event>,
    commands: broadcast::Sender<Event>,
}

impl InProcessEventBus {
    /// Create a new event bus; `capacity` applies to each channel.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            fragments: broadcast::channel(capacity).0,
            devices: broadcast::channel(capacity).0,
            commands: broadcast::channel(capacity).0,
        }
    }

    fn sender(&self, kind: EventKind) -> &broadcast::Sender<Event> {
        match kind {
            EventKind::HardwareDeviceAppeared => &self.fragments,
            EventKind::HdAppeared => &self.devices,
            EventKind::WbPublishMessage => &self.commands,
        }
    }

    /// Subscribe to a single channel.
    ///
    /// The subscription only gets events published *after* it is created.
    #[must_use]
    pub fn subscribe_to(&self, kind: EventKind) -> Subscription {
        Subscription {
            kind,
            receiver: self.sender(kind).subscribe(),
        }
    }
}

impl EventPublisher for InProcessEventBus {
    fn publish(&self, event: Event) -> Result<(), HubError> {
        // broadcast::send fails only when there are zero receivers
        let _ = self.sender(event.kind()).send(event);
        Ok(())
    }
}

/// A receiver bound to one [`EventKind`].
pub struct Subscription {
    kind: EventKind,
    receiver: broadcast::Receiver<Event>,
}

impl Subscription {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Wait for the next event on this channel.
    ///
    /// # Errors
    ///
    /// Returns [`RecvError::Lagged`] when the subscriber fell more than the
    /// bus capacity behind on this channel, and [`RecvError::Closed`] once
    /// the bus is gone.
    pub async fn recv(&mut self) -> Result<Event, RecvError> {
        self.receiver.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wbhub_domain::device::Device;
    use wbhub_domain::event::OutboundMessage;
    use wbhub_domain::hardware::HardwareDevice;

    fn outbound(payload: &str) -> Event {
        Event::WbPublishMessage(OutboundMessage::new(
            "/devices/wb-mr6cu_21/controls/K1/on",
            payload,
        ))
    }

    #[tokio::test]
    async fn should_deliver_event_to_subscriber() {
        let bus = InProcessEventBus::new(16);
        let mut rx = bus.subscribe_to(EventKind::WbPublishMessage);

        bus.publish(outbound("1")).unwrap();

        assert_eq!(rx.recv().await.unwrap(), outbound("1"));
    }

    #[tokio::test]
    async fn should_deliver_event_to_multiple_subscribers() {
        let bus = InProcessEventBus::new(16);
        let mut rx1 = bus.subscribe_to(EventKind::HdAppeared);
        let mut rx2 = bus.subscribe_to(EventKind::HdAppeared);

        bus.publish(Event::HdAppeared(Device::seed("wb-gpio"))).unwrap();

        assert_eq!(rx1.recv().await.unwrap().kind(), EventKind::HdAppeared);
        assert_eq!(rx2.recv().await.unwrap().kind(), EventKind::HdAppeared);
    }

    #[tokio::test]
    async fn should_succeed_when_no_subscribers() {
        let bus = InProcessEventBus::new(16);
        assert!(bus.publish(outbound("0")).is_ok());
    }

    #[tokio::test]
    async fn should_not_deliver_events_published_before_subscription() {
        let bus = InProcessEventBus::new(16);
        bus.publish(outbound("0")).unwrap();

        let mut rx = bus.subscribe_to(EventKind::WbPublishMessage);
        bus.publish(outbound("1")).unwrap();

        assert_eq!(rx.recv().await.unwrap(), outbound("1"));
    }

    #[tokio::test]
    async fn should_filter_subscription_by_kind_preserving_order() {
        let bus = InProcessEventBus::new(16);
        let mut commands = bus.subscribe_to(EventKind::WbPublishMessage);

        bus.publish(Event::HardwareDeviceAppeared(HardwareDevice::new("wb-gpio")))
            .unwrap();
        bus.publish(outbound("1")).unwrap();
        bus.publish(Event::HdAppeared(Device::seed("wb-gpio"))).unwrap();
        bus.publish(outbound("0")).unwrap();

        assert_eq!(commands.kind(), EventKind::WbPublishMessage);
        assert_eq!(commands.recv().await.unwrap(), outbound("1"));
        assert_eq!(commands.recv().await.unwrap(), outbound("0"));
    }

    #[tokio::test]
    async fn should_keep_commands_behind_a_telemetry_burst() {
        let capacity = 16;
        let bus = InProcessEventBus::new(capacity);
        let mut commands = bus.subscribe_to(EventKind::WbPublishMessage);
        let _devices = bus.subscribe_to(EventKind::HdAppeared);

        bus.publish(outbound("1")).unwrap();
        for _ in 0..capacity * 4 {
            bus.publish(Event::HdAppeared(Device::seed("wb-gpio"))).unwrap();
            bus.publish(Event::HardwareDeviceAppeared(HardwareDevice::new("wb-gpio")))
                .unwrap();
        }
        bus.publish(outbound("0")).unwrap();

        assert_eq!(commands.recv().await.unwrap(), outbound("1"));
        assert_eq!(commands.recv().await.unwrap(), outbound("0"));
    }

    #[tokio::test]
    async fn should_report_lag_within_one_channel() {
        let bus = InProcessEventBus::new(2);
        let mut devices = bus.subscribe_to(EventKind::HdAppeared);

        for _ in 0..3 {
            bus.publish(Event::HdAppeared(Device::seed("wb-gpio"))).unwrap();
        }

        assert!(matches!(devices.recv().await, Err(RecvError::Lagged(1))));
    }
}
