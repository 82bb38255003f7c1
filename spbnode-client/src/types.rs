use std::string::FromUtf8Error;

use spbnode_types::{
    payload::StateBirthDeathCertificate,
    topic::{NodeMessage as NodeMessageType, NodeTopic, QoS},
};
use thiserror::Error;

/// Failure reported by a [Client](crate::Client) operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("The client is not connected")]
    NotConnected,
    #[error("The client request queue is full")]
    QueueFull,
    #[error("The client has been closed")]
    Closed,
    #[error("Transport error: {0}")]
    Other(String),
}

/// Error types for inbound message processing.
#[derive(Error, Debug, PartialEq)]
pub enum MessageError {
    #[error("The topic was invalid")]
    InvalidSparkplugTopic,
    #[error("Topic utf8 decode error: {0}")]
    TopicUtf8Error(#[from] FromUtf8Error),
    #[error("Unable to decode state message as json: {0}")]
    StatePayloadJsonDecodeError(String),
}

/// An enum representing the different type message published on a STATE topic.
#[derive(Debug, Clone, PartialEq)]
pub enum StatePayload {
    Online { timestamp: u64 },
    Offline { timestamp: u64 },
}

impl StatePayload {
    pub fn is_online(&self) -> bool {
        matches!(self, StatePayload::Online { .. })
    }
}

impl From<StatePayload> for StateBirthDeathCertificate {
    fn from(value: StatePayload) -> Self {
        match value {
            StatePayload::Online { timestamp } => StateBirthDeathCertificate {
                timestamp,
                online: true,
            },
            StatePayload::Offline { timestamp } => StateBirthDeathCertificate {
                timestamp,
                online: false,
            },
        }
    }
}

impl TryFrom<&[u8]> for StatePayload {
    type Error = MessageError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let cert = StateBirthDeathCertificate::try_from(value)
            .map_err(MessageError::StatePayloadJsonDecodeError)?;
        Ok(match cert.online {
            true => StatePayload::Online {
                timestamp: cert.timestamp,
            },
            false => StatePayload::Offline {
                timestamp: cert.timestamp,
            },
        })
    }
}

/// A message received on a node level topic.
///
/// The payload is left encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeMessage {
    /// The group the node belongs to.
    pub group_id: String,
    /// The nodes unique identifier.
    pub node_id: String,
    /// The topic message type.
    pub kind: NodeMessageType,
    pub payload: Vec<u8>,
}

/// An enum that represents the different types of events an [EventLoop](crate::EventLoop) implementation can produce.
#[derive(Debug, PartialEq)]
pub enum Event {
    /// The connection was lost.
    Offline,
    /// The connection is established.
    Online,
    /// A connection attempt failed. The event loop retries on the next poll.
    ConnectFailed { reason: String },
    Node(NodeMessage),
    State {
        host_id: String,
        payload: StatePayload,
    },
    InvalidPublish {
        reason: MessageError,
        topic: Vec<u8>,
        payload: Vec<u8>,
    },
}

/// Structure representing the last will of a node
#[derive(Debug, Clone, PartialEq)]
pub struct LastWill {
    pub topic: String,
    pub retain: bool,
    pub qos: QoS,
    pub payload: Vec<u8>,
}

impl LastWill {
    /// Create the NDEATH will for a node from an encoded death payload
    pub fn new_node(group: &str, node_id: &str, payload: Vec<u8>) -> Self {
        let topic = NodeTopic::new(group, NodeMessageType::NDeath, node_id);
        let (qos, retain) = topic.get_publish_quality_retain();
        Self {
            retain,
            qos,
            payload,
            topic: topic.topic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_will() {
        let will = LastWill::new_node("BME280", "Node1", vec![1, 2]);
        assert_eq!(will.topic, "spBv1.0/BME280/NDEATH/Node1");
        assert_eq!(will.qos, QoS::AtLeastOnce);
        assert!(!will.retain);
        assert_eq!(will.payload, vec![1, 2]);
    }

    #[test]
    fn state_payload_json() {
        let p = StatePayload::try_from(br#"{"online":false,"timestamp":3}"#.as_slice()).unwrap();
        assert_eq!(p, StatePayload::Offline { timestamp: 3 });
        assert!(!p.is_online());
        assert!(matches!(
            StatePayload::try_from(b"{}".as_slice()),
            Err(MessageError::StatePayloadJsonDecodeError(_))
        ));
    }
}
