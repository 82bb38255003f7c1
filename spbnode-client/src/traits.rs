use async_trait::async_trait;
use spbnode_types::topic::{NodeTopic, TopicFilter};

use crate::{Event, LastWill, TransportError};

#[async_trait]
pub trait Client {
    /// Disconnects the client.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Drops the current connection. Unlike `disconnect`, the event loop reports the
    /// connection as lost and goes on to establish a new one.
    async fn reconnect(&self) -> Result<(), TransportError>;

    /// Publishes an encoded payload to a node topic.
    ///
    /// This method will yield to the async runtime until the message is accepted by the client
    async fn publish_node_message(
        &self,
        topic: NodeTopic,
        payload: Vec<u8>,
    ) -> Result<(), TransportError>;

    /// Attempts to publish an encoded payload to a node topic.
    ///
    /// Unlike `publish_node_message`, this method may return early if the client cannot process the message
    /// e.g the message queue is full.
    async fn try_publish_node_message(
        &self,
        topic: NodeTopic,
        payload: Vec<u8>,
    ) -> Result<(), TransportError>;

    /// Subscribes to a single topic.
    async fn subscribe(&self, topic: TopicFilter) -> Result<(), TransportError> {
        self.subscribe_many(vec![topic]).await
    }

    /// Subscribes to multiple topics in a single operation.
    async fn subscribe_many(&self, topics: Vec<TopicFilter>) -> Result<(), TransportError>;
}

pub type DynClient = dyn Client + Send + Sync;

#[async_trait]
pub trait EventLoop {
    /// Wait for the next transport event.
    ///
    /// Reconnection is driven by repeatedly polling. `None` means the
    /// transport is gone for good and no further events will be produced.
    async fn poll(&mut self) -> Option<Event>;

    /// Install the will the broker publishes if the connection drops.
    /// Applies to the next connection attempt.
    fn set_last_will(&mut self, will: LastWill);
}

pub type DynEventLoop = dyn EventLoop + Send;
