use spbnode::{
    client::channel::ChannelEventLoop,
    eon::{BirthMetric, EoNBuilder, NodeState},
    types::{codec, Metric},
};

#[test]
fn facade_builds_node() {
    let (eventloop, client, _broker) = ChannelEventLoop::new();
    let (_eon, handle) = EoNBuilder::new(eventloop, client)
        .with_group_id("BME280")
        .with_node_id("Node1")
        .with_metric(BirthMetric::new_with_initial_value("Temperature", 20.0_f64))
        .build()
        .unwrap();
    assert_eq!(handle.state(), NodeState::Disconnected);
}

#[test]
fn facade_codec() {
    let metrics = vec![Metric::new("Counter", 1_u64)];
    let bytes = codec::encode_metrics(&metrics).unwrap();
    assert_eq!(codec::decode_metrics(&bytes).unwrap(), metrics);
}

#[cfg(feature = "rumqtt-client")]
#[test]
fn facade_mqtt_options() {
    let opts = spbnode::client_rumqtt::MqttOptions::new("node1", "localhost", 1883);
    assert_eq!(opts.port, 1883);
}
