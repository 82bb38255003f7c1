use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use log::{error, trace, warn};
use rumqttc::{
    v5::{
        mqttbytes::{
            v5::{ConnectProperties, Filter, Packet},
            QoS,
        },
        AsyncClient as RuClient, ClientError, EventLoop as RuEventLoop,
        MqttOptions as RuMqttOptions,
    },
    Outgoing,
};
use spbnode_types::topic::{NodeTopic, TopicFilter};

use spbnode_client::{topic_and_payload_to_event, Event, LastWill, TransportError};

use crate::{MqttOptions, OptionsError};

fn qos_to_mqtt_qos(qos: spbnode_types::topic::QoS) -> QoS {
    match qos {
        spbnode_types::topic::QoS::AtMostOnce => QoS::AtMostOnce,
        spbnode_types::topic::QoS::AtLeastOnce => QoS::AtLeastOnce,
        spbnode_types::topic::QoS::ExactlyOnce => QoS::ExactlyOnce,
    }
}

fn topic_filter_to_mqtt_filter(topic_filter: TopicFilter) -> Filter {
    Filter::new(
        String::from(topic_filter.topic),
        qos_to_mqtt_qos(topic_filter.qos),
    )
}

fn client_error(e: ClientError) -> TransportError {
    match e {
        ClientError::TryRequest(_) => TransportError::QueueFull,
        ClientError::Request(_) => TransportError::Closed,
    }
}

/// A [spbnode_client::Client] implementation using [rumqttc]
#[derive(Clone)]
pub struct Client {
    client: RuClient,
    reconnect: Arc<AtomicBool>,
}

#[async_trait]
impl spbnode_client::Client for Client {
    async fn disconnect(&self) -> Result<(), TransportError> {
        self.client.disconnect().await.map_err(client_error)
    }

    async fn reconnect(&self) -> Result<(), TransportError> {
        self.reconnect.store(true, Ordering::SeqCst);
        let result = self.client.disconnect().await.map_err(client_error);
        if result.is_err() {
            self.reconnect.store(false, Ordering::SeqCst);
        }
        result
    }

    async fn publish_node_message(
        &self,
        topic: NodeTopic,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        let (qos, retain) = topic.get_publish_quality_retain();
        self.client
            .publish(topic.topic, qos_to_mqtt_qos(qos), retain, payload)
            .await
            .map_err(client_error)
    }

    async fn try_publish_node_message(
        &self,
        topic: NodeTopic,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        let (qos, retain) = topic.get_publish_quality_retain();
        self.client
            .try_publish(topic.topic, qos_to_mqtt_qos(qos), retain, payload)
            .map_err(client_error)
    }

    async fn subscribe_many(&self, topics: Vec<TopicFilter>) -> Result<(), TransportError> {
        let filters: Vec<Filter> = topics.into_iter().map(topic_filter_to_mqtt_filter).collect();
        self.client
            .subscribe_many(filters)
            .await
            .map_err(client_error)
    }
}

enum ConnectionState {
    Disconnected,
    ManualDisconnected,
    Connected,
}

/// A [spbnode_client::EventLoop] implementation using [rumqttc]
pub struct EventLoop {
    state: ConnectionState,
    el: RuEventLoop,
    /// Set by [Client] when the next outgoing disconnect should be followed by a new connection
    reconnect: Arc<AtomicBool>,
}

impl EventLoop {
    /// Create a new `EventLoop` from raw rumqttc options.
    ///
    /// Clean start and a session expiry interval of 0 are forced on the options.
    ///
    /// `cap` specifies the capacity of the bounded async channel for the client handle.
    pub fn new(options: RuMqttOptions, cap: usize) -> (Self, Client) {
        let mut options = options;
        let mut connection_properties = options
            .connect_properties()
            .unwrap_or_else(ConnectProperties::new);
        connection_properties.session_expiry_interval = Some(0);

        options
            .set_clean_start(true)
            .set_connect_properties(connection_properties);

        let (client, eventloop) = RuClient::new(options, cap);
        let reconnect = Arc::new(AtomicBool::new(false));
        (
            EventLoop {
                el: eventloop,
                state: ConnectionState::Disconnected,
                reconnect: reconnect.clone(),
            },
            Client { client, reconnect },
        )
    }

    /// Create a new `EventLoop` from deserialisable [MqttOptions], loading any TLS material they reference.
    pub fn from_options(options: MqttOptions, cap: usize) -> Result<(Self, Client), OptionsError> {
        Ok(Self::new(options.try_into()?, cap))
    }

    async fn poll_rumqtt(&mut self) -> Option<Option<Event>> {
        match self.el.poll().await {
            Ok(event) => {
                trace!("{event:?}");
                match event {
                    rumqttc::v5::Event::Incoming(Packet::ConnAck(_)) => {
                        self.state = ConnectionState::Connected;
                        Some(Some(Event::Online))
                    }
                    rumqttc::v5::Event::Incoming(Packet::Disconnect(_)) => {
                        self.state = ConnectionState::Disconnected;
                        Some(Some(Event::Offline))
                    }
                    rumqttc::v5::Event::Incoming(Packet::Publish(publish)) => {
                        let event =
                            match topic_and_payload_to_event(&publish.topic, publish.payload.to_vec())
                            {
                                Ok(event) => event,
                                Err(reason) => {
                                    warn!("Invalid publish received: {reason}");
                                    Event::InvalidPublish {
                                        reason,
                                        topic: publish.topic.to_vec(),
                                        payload: publish.payload.to_vec(),
                                    }
                                }
                            };
                        Some(Some(event))
                    }
                    rumqttc::v5::Event::Outgoing(Outgoing::Disconnect) => {
                        self.state = match self.reconnect.swap(false, Ordering::SeqCst) {
                            true => ConnectionState::Disconnected,
                            false => ConnectionState::ManualDisconnected,
                        };
                        Some(Some(Event::Offline))
                    }
                    _ => None,
                }
            }
            Err(e) => match self.state {
                ConnectionState::Connected => {
                    error!("Client error: {e}");
                    self.state = ConnectionState::Disconnected;
                    Some(Some(Event::Offline))
                }
                ConnectionState::Disconnected => {
                    error!("Client error on connect attempt: {e}");
                    tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
                    Some(Some(Event::ConnectFailed {
                        reason: e.to_string(),
                    }))
                }
                ConnectionState::ManualDisconnected => Some(None),
            },
        }
    }
}

#[async_trait]
impl spbnode_client::EventLoop for EventLoop {
    async fn poll(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.poll_rumqtt().await {
                return event;
            }
        }
    }

    fn set_last_will(&mut self, will: LastWill) {
        let qos = qos_to_mqtt_qos(will.qos);
        let mqtt_will = rumqttc::v5::mqttbytes::v5::LastWill::new(
            will.topic,
            will.payload,
            qos,
            will.retain,
            None,
        );
        self.el.options.set_last_will(mqtt_will);
    }
}
