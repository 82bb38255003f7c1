use crate::constants::{NBIRTH, NCMD, NDATA, NDEATH, SPBV01, STATE};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeMessage {
    NBirth,
    NDeath,
    NData,
    NCmd,
}

impl NodeMessage {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeMessage::NBirth => NBIRTH,
            NodeMessage::NDeath => NDEATH,
            NodeMessage::NData => NDATA,
            NodeMessage::NCmd => NCMD,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            NBIRTH => Some(NodeMessage::NBirth),
            NDEATH => Some(NodeMessage::NDeath),
            NDATA => Some(NodeMessage::NData),
            NCMD => Some(NodeMessage::NCmd),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodeTopic {
    pub topic: String,
    pub message_type: NodeMessage,
}

impl NodeTopic {
    pub fn new(group_id: &str, message_type: NodeMessage, node_id: &str) -> Self {
        Self {
            topic: node_topic(group_id, &message_type, node_id),
            message_type,
        }
    }

    /// The QoS and retain flag a message of this type is published with
    pub fn get_publish_quality_retain(&self) -> (QoS, bool) {
        match self.message_type {
            NodeMessage::NBirth => (QoS::AtMostOnce, false),
            NodeMessage::NData => (QoS::AtMostOnce, false),
            NodeMessage::NCmd => (QoS::AtMostOnce, false),
            NodeMessage::NDeath => (QoS::AtLeastOnce, false),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StateTopic {
    topic: String,
}

impl StateTopic {
    /// Wildcard subscription covering every host's STATE topic
    pub fn new() -> Self {
        Self {
            topic: state_sub_topic(),
        }
    }

    pub fn new_host(host_id: &str) -> Self {
        Self {
            topic: state_host_topic(host_id),
        }
    }
}

impl Default for StateTopic {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Topic {
    NodeTopic(NodeTopic),
    State(StateTopic),
}

impl From<Topic> for String {
    fn from(value: Topic) -> Self {
        match value {
            Topic::NodeTopic(node_topic) => node_topic.topic,
            Topic::State(state_topic) => state_topic.topic,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TopicFilter {
    pub topic: Topic,
    pub qos: QoS,
}

impl TopicFilter {
    pub fn new(topic: Topic) -> Self {
        Self::new_with_qos(topic, QoS::AtMostOnce)
    }

    pub fn new_with_qos(topic: Topic, qos: QoS) -> Self {
        Self { topic, qos }
    }
}

/// A topic received from the broker, split into its Sparkplug parts
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedTopic<'a> {
    Node {
        group_id: &'a str,
        message_type: NodeMessage,
        node_id: &'a str,
    },
    State {
        host_id: &'a str,
    },
}

/// Parse a node or STATE topic. Device level and non Sparkplug topics return `None`.
pub fn parse_topic(topic: &str) -> Option<ParsedTopic<'_>> {
    let mut parts = topic.split('/');
    if parts.next()? != SPBV01 {
        return None;
    }
    let second = parts.next()?;
    if second == STATE {
        let host_id = parts.next()?;
        if host_id.is_empty() || parts.next().is_some() {
            return None;
        }
        return Some(ParsedTopic::State { host_id });
    }
    let message_type = NodeMessage::parse(parts.next()?)?;
    let node_id = parts.next()?;
    if second.is_empty() || node_id.is_empty() || parts.next().is_some() {
        return None;
    }
    Some(ParsedTopic::Node {
        group_id: second,
        message_type,
        node_id,
    })
}

pub fn node_topic(group_id: &str, message_type: &NodeMessage, node_id: &str) -> String {
    format!("{}/{}/{}/{}", SPBV01, group_id, message_type.as_str(), node_id)
}

pub fn state_host_topic(host_id: &str) -> String {
    format!("{}/{}/{}", SPBV01, STATE, host_id)
}

pub fn state_sub_topic() -> String {
    state_host_topic("+")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_topics() {
        let t = NodeTopic::new("BME280", NodeMessage::NBirth, "Node1");
        assert_eq!(t.topic, "spBv1.0/BME280/NBIRTH/Node1");
        assert_eq!(
            NodeTopic::new("G", NodeMessage::NCmd, "N").topic,
            "spBv1.0/G/NCMD/N"
        );
        assert_eq!(
            NodeTopic::new("G", NodeMessage::NDeath, "N").get_publish_quality_retain(),
            (QoS::AtLeastOnce, false)
        );
    }

    #[test]
    fn state_topics() {
        let s: String = Topic::State(StateTopic::new()).into();
        assert_eq!(s, "spBv1.0/STATE/+");
        let s: String = Topic::State(StateTopic::new_host("scada")).into();
        assert_eq!(s, "spBv1.0/STATE/scada");
    }

    #[test]
    fn parse() {
        assert_eq!(
            parse_topic("spBv1.0/BME280/NCMD/Node1"),
            Some(ParsedTopic::Node {
                group_id: "BME280",
                message_type: NodeMessage::NCmd,
                node_id: "Node1"
            })
        );
        assert_eq!(
            parse_topic("spBv1.0/STATE/scada"),
            Some(ParsedTopic::State { host_id: "scada" })
        );
        assert_eq!(parse_topic("spBv1.0/G/DCMD/N/D"), None);
        assert_eq!(parse_topic("spBv1.0/G/NCMD/N/extra"), None);
        assert_eq!(parse_topic("other/G/NCMD/N"), None);
        assert_eq!(parse_topic("spBv1.0/STATE"), None);
    }
}
