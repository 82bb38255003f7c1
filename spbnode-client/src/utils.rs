use crate::{Event, MessageError, NodeMessage, StatePayload};

use spbnode_types::topic::{parse_topic, ParsedTopic};

/// Map a raw MQTT publish to the [Event] a node cares about.
///
/// Node topics produce [Event::Node] with the payload left encoded, STATE
/// topics produce [Event::State]. Anything else is an error.
pub fn topic_and_payload_to_event(topic: &[u8], payload: Vec<u8>) -> Result<Event, MessageError> {
    let topic = String::from_utf8(topic.to_vec())?;
    match parse_topic(&topic).ok_or(MessageError::InvalidSparkplugTopic)? {
        ParsedTopic::Node {
            group_id,
            message_type,
            node_id,
        } => Ok(Event::Node(NodeMessage {
            group_id: group_id.to_string(),
            node_id: node_id.to_string(),
            kind: message_type,
            payload,
        })),
        ParsedTopic::State { host_id } => Ok(Event::State {
            host_id: host_id.to_string(),
            payload: StatePayload::try_from(payload.as_slice())?,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spbnode_types::topic::NodeMessage as NodeMessageType;

    #[test]
    fn ncmd_event() {
        let event = topic_and_payload_to_event(b"spBv1.0/BME280/NCMD/Node1", vec![9]).unwrap();
        assert_eq!(
            event,
            Event::Node(NodeMessage {
                group_id: "BME280".into(),
                node_id: "Node1".into(),
                kind: NodeMessageType::NCmd,
                payload: vec![9],
            })
        );
    }

    #[test]
    fn state_event() {
        let event = topic_and_payload_to_event(
            b"spBv1.0/STATE/scada",
            br#"{"online" : true, "timestamp" : 10}"#.to_vec(),
        )
        .unwrap();
        assert_eq!(
            event,
            Event::State {
                host_id: "scada".into(),
                payload: StatePayload::Online { timestamp: 10 }
            }
        );
    }

    #[test]
    fn invalid_topics() {
        assert_eq!(
            topic_and_payload_to_event(b"spBv1.0/G/DDATA/N/D", vec![]),
            Err(MessageError::InvalidSparkplugTopic)
        );
        assert!(matches!(
            topic_and_payload_to_event(b"spBv1.0/\xff/NCMD/N", vec![]),
            Err(MessageError::TopicUtf8Error(_))
        ));
        assert!(matches!(
            topic_and_payload_to_event(b"spBv1.0/STATE/scada", b"OFFLINE".to_vec()),
            Err(MessageError::StatePayloadJsonDecodeError(_))
        ));
    }
}
