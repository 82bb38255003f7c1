use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use spbnode_client::{channel::ChannelClient, Client, TransportError};
use spbnode_types::topic::{NodeMessage, NodeTopic, TopicFilter};

/// A [ChannelClient] whose NBIRTH publishes can be slowed down or rejected
pub struct BirthControlClient {
    inner: ChannelClient,
    birth_delay: Duration,
    births_to_fail: AtomicUsize,
}

impl BirthControlClient {
    /// Every NBIRTH publish suspends for `delay` before reaching the broker
    pub fn delay_births(inner: ChannelClient, delay: Duration) -> Self {
        Self {
            inner,
            birth_delay: delay,
            births_to_fail: AtomicUsize::new(0),
        }
    }

    /// The first `count` NBIRTH publishes fail with [TransportError::NotConnected]
    pub fn fail_births(inner: ChannelClient, count: usize) -> Self {
        Self {
            inner,
            birth_delay: Duration::ZERO,
            births_to_fail: AtomicUsize::new(count),
        }
    }
}

#[async_trait]
impl Client for BirthControlClient {
    async fn disconnect(&self) -> Result<(), TransportError> {
        self.inner.disconnect().await
    }

    async fn reconnect(&self) -> Result<(), TransportError> {
        self.inner.reconnect().await
    }

    async fn publish_node_message(
        &self,
        topic: NodeTopic,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        if topic.message_type == NodeMessage::NBirth {
            let fail = self
                .births_to_fail
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if fail {
                return Err(TransportError::NotConnected);
            }
            if !self.birth_delay.is_zero() {
                tokio::time::sleep(self.birth_delay).await;
            }
        }
        self.inner.publish_node_message(topic, payload).await
    }

    async fn try_publish_node_message(
        &self,
        topic: NodeTopic,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        self.inner.try_publish_node_message(topic, payload).await
    }

    async fn subscribe_many(&self, topics: Vec<TopicFilter>) -> Result<(), TransportError> {
        self.inner.subscribe_many(topics).await
    }
}
