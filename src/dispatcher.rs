//! Dispatcher interface: the per-thread event queue of the broker.
//!
//! All cluster-state mutations execute on one dispatcher task per
//! cluster. Worker threads (queue handlers, I/O) never touch cluster
//! state directly; they post events through a [`Dispatcher`] and the
//! single consumer applies them in arrival order. That confinement is
//! the control plane's whole concurrency story: within the coordinator
//! there are no locks because there is no second writer.
//!
//! The concrete queues live in the surrounding system; the core consumes
//! the narrow [`Dispatcher`] trait. [`ChannelDispatcher`] is the
//! reference implementation: one unbounded tokio channel per registered
//! client, `post`-style sends that never block, one consumer task per
//! receiver.

use std::collections::HashMap;
use std::fmt;
use tokio::sync::mpsc;
use tracing::warn;

use crate::blob::Blob;
use crate::cluster::messages::{AckMessage, ClusterMessage};

/// Identifies a client session attached to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClientId(pub u64);

impl ClientId {
    /// Create a client id from a raw value.
    #[inline]
    pub const fn new(value: u64) -> Self {
        ClientId(value)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of a dispatcher event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DispatcherEventType {
    /// Not a real event; fresh events start here.
    #[default]
    Undefined,
    /// PUT acknowledgement (or NACK) heading back to a client.
    Ack,
    /// Message publication.
    Put,
    /// Consumer confirmation.
    Confirm,
    /// Cluster-state advisory traffic.
    ClusterState,
}

/// An event flowing through a dispatcher queue.
///
/// Setters chain, so building an event reads as one expression at the
/// dispatch site.
#[derive(Debug, Clone, Default)]
pub struct DispatcherEvent {
    event_type: DispatcherEventType,
    ack_message: Option<AckMessage>,
    cluster_message: Option<ClusterMessage>,
    blob: Option<Blob>,
    options: Option<Blob>,
}

impl DispatcherEvent {
    /// Create an undefined event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the event kind.
    pub fn set_type(&mut self, event_type: DispatcherEventType) -> &mut Self {
        self.event_type = event_type;
        self
    }

    /// Attach an ACK message.
    pub fn set_ack_message(&mut self, ack: AckMessage) -> &mut Self {
        self.ack_message = Some(ack);
        self
    }

    /// Attach a cluster control message.
    pub fn set_cluster_message(&mut self, message: ClusterMessage) -> &mut Self {
        self.cluster_message = Some(message);
        self
    }

    /// Attach the payload blob.
    pub fn set_blob(&mut self, blob: Blob) -> &mut Self {
        self.blob = Some(blob);
        self
    }

    /// Attach the options blob.
    pub fn set_options(&mut self, options: Blob) -> &mut Self {
        self.options = Some(options);
        self
    }

    /// Event kind.
    pub fn event_type(&self) -> DispatcherEventType {
        self.event_type
    }

    /// ACK message, when attached.
    pub fn ack_message(&self) -> Option<&AckMessage> {
        self.ack_message.as_ref()
    }

    /// Cluster control message, when attached.
    pub fn cluster_message(&self) -> Option<&ClusterMessage> {
        self.cluster_message.as_ref()
    }

    /// Payload blob, when attached.
    pub fn blob(&self) -> Option<&Blob> {
        self.blob.as_ref()
    }

    /// Options blob, when attached.
    pub fn options(&self) -> Option<&Blob> {
        self.options.as_ref()
    }
}

/// The event queue interface the core dispatches through.
pub trait Dispatcher: Send {
    /// Obtain a fresh event addressed to `client`.
    fn get_event(&mut self, client: ClientId) -> DispatcherEvent;

    /// Enqueue `event` for `client` and return immediately.
    fn dispatch_event(&mut self, event: DispatcherEvent, client: ClientId);
}

/// Channel-backed dispatcher: one unbounded queue per registered client.
#[derive(Debug, Default)]
pub struct ChannelDispatcher {
    queues: HashMap<ClientId, mpsc::UnboundedSender<DispatcherEvent>>,
}

impl ChannelDispatcher {
    /// Create a dispatcher with no registered clients.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `client` and return the receiving end of its queue.
    /// The caller runs the consumer task; there must be exactly one.
    pub fn register_client(&mut self, client: ClientId) -> mpsc::UnboundedReceiver<DispatcherEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.queues.insert(client, tx);
        rx
    }

    /// Drop `client`'s queue. In-flight events already received stay
    /// with the consumer.
    pub fn unregister_client(&mut self, client: ClientId) {
        self.queues.remove(&client);
    }

    /// Number of registered clients.
    pub fn client_count(&self) -> usize {
        self.queues.len()
    }
}

impl Dispatcher for ChannelDispatcher {
    fn get_event(&mut self, _client: ClientId) -> DispatcherEvent {
        DispatcherEvent::new()
    }

    fn dispatch_event(&mut self, event: DispatcherEvent, client: ClientId) {
        match self.queues.get(&client) {
            Some(queue) => {
                if queue.send(event).is_err() {
                    warn!(client = %client, "dispatch to closed client queue, dropping event");
                    self.queues.remove(&client);
                }
            }
            None => {
                warn!(client = %client, "dispatch to unregistered client, dropping event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AckResult, MessageGuid};
    use crate::types::{CorrelationId, QueueId};

    fn nack() -> AckMessage {
        AckMessage {
            status: AckResult::LimitMessages.to_code(),
            correlation_id: CorrelationId::new(7),
            guid: MessageGuid::default(),
            queue_id: QueueId::new(3),
        }
    }

    #[tokio::test]
    async fn test_dispatch_round_trip() {
        let mut dispatcher = ChannelDispatcher::new();
        let client = ClientId::new(1);
        let mut rx = dispatcher.register_client(client);

        let mut event = dispatcher.get_event(client);
        event
            .set_type(DispatcherEventType::Ack)
            .set_ack_message(nack());
        dispatcher.dispatch_event(event, client);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type(), DispatcherEventType::Ack);
        assert_eq!(
            received.ack_message().unwrap().correlation_id,
            CorrelationId::new(7)
        );
    }

    #[tokio::test]
    async fn test_dispatch_preserves_order() {
        let mut dispatcher = ChannelDispatcher::new();
        let client = ClientId::new(1);
        let mut rx = dispatcher.register_client(client);

        for i in 0..10u64 {
            let mut event = dispatcher.get_event(client);
            event.set_type(DispatcherEventType::Confirm).set_blob(
                Blob::from_bytes(bytes::Bytes::from(i.to_be_bytes().to_vec())),
            );
            dispatcher.dispatch_event(event, client);
        }

        for i in 0..10u64 {
            let event = rx.recv().await.unwrap();
            let mut bytes = [0u8; 8];
            assert!(event
                .blob()
                .unwrap()
                .copy_to_slice(crate::blob::BlobPosition::default(), &mut bytes));
            assert_eq!(u64::from_be_bytes(bytes), i);
        }
    }

    #[tokio::test]
    async fn test_dispatch_to_unknown_client_is_dropped() {
        let mut dispatcher = ChannelDispatcher::new();
        let event = DispatcherEvent::new();
        // Must not panic.
        dispatcher.dispatch_event(event, ClientId::new(42));
    }

    #[tokio::test]
    async fn test_dispatch_to_closed_queue_unregisters() {
        let mut dispatcher = ChannelDispatcher::new();
        let client = ClientId::new(1);
        let rx = dispatcher.register_client(client);
        drop(rx);

        dispatcher.dispatch_event(DispatcherEvent::new(), client);
        assert_eq!(dispatcher.client_count(), 0);
    }

    #[test]
    fn test_event_builder_chain() {
        let mut event = DispatcherEvent::new();
        assert_eq!(event.event_type(), DispatcherEventType::Undefined);

        event
            .set_type(DispatcherEventType::Put)
            .set_blob(Blob::from_bytes(bytes::Bytes::from_static(b"payload")))
            .set_options(Blob::from_bytes(bytes::Bytes::from_static(b"opts")));
        assert_eq!(event.event_type(), DispatcherEventType::Put);
        assert!(event.blob().is_some());
        assert!(event.options().is_some());
        assert!(event.ack_message().is_none());
    }
}
