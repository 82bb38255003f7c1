use std::time::Duration;

use spbnode_client::{
    channel::{ChannelBroker, OutboundMessage},
    Event, NodeMessage,
};
use spbnode_eon::{NodeHandle, NodeState};
use spbnode_types::{
    codec::{decode, encode_metrics},
    constants::{BDSEQ, NODE_CONTROL_REBIRTH},
    topic::{NodeMessage as NodeMessageType, NodeTopic, QoS, StateTopic, Topic, TopicFilter},
    DataType, Metric, Payload, Value,
};
use tokio::time::{sleep, timeout};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn verify_ndeath_payload(payload: &[u8], expected_bdseq: i64) {
    let payload = decode(payload).unwrap();
    assert_eq!(payload.seq, None);
    assert_eq!(payload.metrics.len(), 1);
    assert_eq!(payload.metrics[0].name.as_deref(), Some(BDSEQ));
    assert_eq!(payload.metrics[0].value, Some(Value::Int64(expected_bdseq)));
}

pub fn verify_nbirth_payload(payload: &[u8], expected_bdseq: i64) -> Payload {
    let payload = decode(payload).unwrap();
    assert_eq!(payload.seq, Some(0));
    assert_ne!(payload.timestamp, None);

    let mut contains_node_control = false;
    let mut contains_bdseq = false;
    for metric in &payload.metrics {
        let metric_name = match &metric.name {
            Some(name) => name,
            None => panic!("Metric name is required in birth payload"),
        };

        if metric_name.eq(NODE_CONTROL_REBIRTH) {
            contains_node_control = true;
            assert_eq!(metric.alias, None);
            assert_eq!(metric.datatype, DataType::Boolean);
            assert_eq!(metric.value, Some(Value::Boolean(false)));
        }

        if metric_name.eq(BDSEQ) {
            contains_bdseq = true;
            assert_eq!(metric.alias, None);
            assert_eq!(metric.datatype, DataType::Int64);
            assert_eq!(metric.value, Some(Value::Int64(expected_bdseq)));
        }
    }
    assert!(contains_node_control);
    assert!(contains_bdseq);
    payload
}

pub async fn next_outbound(broker: &mut ChannelBroker) -> OutboundMessage {
    timeout(Duration::from_secs(1), broker.rx_outbound.recv())
        .await
        .unwrap()
        .unwrap()
}

pub async fn next_node_message(broker: &mut ChannelBroker) -> (NodeTopic, Vec<u8>) {
    match next_outbound(broker).await {
        OutboundMessage::NodeMessage { topic, payload } => (topic, payload),
        message => panic!("got {message:?}"),
    }
}

/// Assert nothing is published within `window`
pub async fn assert_silent(broker: &mut ChannelBroker, window: Duration) {
    if let Ok(message) = timeout(window, broker.rx_outbound.recv()).await {
        panic!("expected no outbound message, got {message:?}");
    }
}

pub async fn wait_for_state(handle: &NodeHandle, state: NodeState) {
    timeout(Duration::from_secs(1), async {
        while handle.state() != state {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("node did not reach {state}, is {}", handle.state()));
}

/// Bring the node online and verify its subscriptions and birth. Returns the raw birth bytes.
pub async fn test_node_online(
    broker: &mut ChannelBroker,
    group_id: &str,
    node_id: &str,
    primary_host_id: Option<&str>,
    expected_bdseq: i64,
) -> Vec<u8> {
    broker.tx_event.send(Event::Online).unwrap();
    let filters = match next_outbound(broker).await {
        OutboundMessage::Subscribe(filters) => filters,
        message => panic!("got {message:?}"),
    };

    let mut expected_filters = vec![TopicFilter::new_with_qos(
        Topic::NodeTopic(NodeTopic::new(group_id, NodeMessageType::NCmd, node_id)),
        QoS::AtLeastOnce,
    )];
    if let Some(host_id) = primary_host_id {
        expected_filters.push(TopicFilter::new_with_qos(
            Topic::State(StateTopic::new_host(host_id)),
            QoS::AtLeastOnce,
        ));
    }
    assert_eq!(filters, expected_filters);

    let (topic, payload) = next_node_message(broker).await;
    assert_eq!(
        topic,
        NodeTopic::new(group_id, NodeMessageType::NBirth, node_id)
    );
    verify_nbirth_payload(&payload, expected_bdseq);
    payload
}

pub fn create_cmd_message(group_id: &str, node_id: &str, metrics: &[Metric]) -> Event {
    Event::Node(NodeMessage {
        group_id: group_id.to_string(),
        node_id: node_id.to_string(),
        kind: NodeMessageType::NCmd,
        payload: encode_metrics(metrics).unwrap(),
    })
}

pub fn create_rebirth_message(group_id: &str, node_id: &str) -> Event {
    create_cmd_message(
        group_id,
        node_id,
        &[Metric::new(NODE_CONTROL_REBIRTH, true)],
    )
}

// Test graceful shutdown using handle.cancel()
pub async fn test_graceful_shutdown(
    broker: &mut ChannelBroker,
    handle: &NodeHandle,
    group_id: &str,
    node_id: &str,
    expected_bdseq: i64,
) {
    handle.cancel().await;
    let (topic, payload) = next_node_message(broker).await;
    assert_eq!(
        topic,
        NodeTopic::new(group_id, NodeMessageType::NDeath, node_id)
    );
    verify_ndeath_payload(&payload, expected_bdseq);

    assert_eq!(next_outbound(broker).await, OutboundMessage::Disconnect);
    assert_eq!(handle.state(), NodeState::Shutdown);
}
