use spbnode_types::{
    codec::{decode, decode_metrics, encode, encode_metrics},
    payload::{self, DataType, Message},
    CodecError, DataSet, DateTime, Metric, Payload, Template, Value,
};

fn birth_metrics() -> Vec<Metric> {
    vec![
        Metric::new("bdSeq", 0_i64),
        Metric::new("Node Control/Rebirth", false),
        Metric::new("Temperature", 21.5_f64).with_alias(1),
        Metric::new("Humidity", 40.25_f64).with_alias(2),
        Metric::new("Pressure", 1013.2_f64).with_alias(3),
        Metric::null("Fault", DataType::String).with_alias(4),
        Metric::new("Uptime", u64::MAX).with_alias(5),
        Metric::new("Boot", DateTime::new(1_700_000_000_000)),
        Metric::new("Samples", vec![1_i16, -1, i16::MAX]),
    ]
}

#[test]
fn metric_sequence_roundtrip() {
    let metrics = birth_metrics();
    let bytes = encode_metrics(&metrics).unwrap();
    assert_eq!(decode_metrics(&bytes).unwrap(), metrics);
}

#[test]
fn payload_roundtrip_keeps_seq_and_order() {
    let payload = Payload::new(1_700_000_000_123, Some(255), birth_metrics());
    let decoded = decode(&encode(&payload).unwrap()).unwrap();
    assert_eq!(decoded.seq, Some(255));
    assert_eq!(decoded, payload);
    let names: Vec<_> = decoded
        .metrics
        .iter()
        .map(|m| m.name.clone().unwrap_or_default())
        .collect();
    assert_eq!(names[2], "Temperature");
    assert_eq!(names[8], "Samples");
}

#[test]
fn wire_form_follows_protobuf_schema() {
    let payload = Payload::new(
        10,
        Some(3),
        vec![
            Metric::new("Int8", -2_i8),
            Metric::new("Int64", -1_i64),
            Metric::null("Nothing", DataType::Double),
        ],
    );
    let proto = payload::Payload::decode(encode(&payload).unwrap().as_slice()).unwrap();
    assert_eq!(proto.timestamp, Some(10));
    assert_eq!(proto.seq, Some(3));
    assert_eq!(
        proto.metrics[0].value,
        Some(payload::metric::Value::IntValue(0xfe))
    );
    assert_eq!(proto.metrics[0].datatype, Some(DataType::Int8 as u32));
    assert_eq!(
        proto.metrics[1].value,
        Some(payload::metric::Value::LongValue(u64::MAX))
    );
    assert_eq!(proto.metrics[2].is_null, Some(true));
    assert_eq!(proto.metrics[2].value, None);
}

#[test]
fn nested_template_with_dataset() {
    let table = DataSet::new([("ts", DataType::DateTime), ("ok", DataType::Boolean)])
        .unwrap()
        .with_row(vec![Some(Value::DateTime(DateTime::new(5))), None])
        .unwrap();
    let definition = Template::definition(vec![
        Metric::new("History", table),
        Metric::null("Setpoint", DataType::Float),
    ])
    .with_version("2");
    let metrics = vec![Metric::new("_types_/Controller", definition)];
    let bytes = encode_metrics(&metrics).unwrap();
    assert_eq!(decode_metrics(&bytes).unwrap(), metrics);
}

#[test]
fn duplicate_name_inside_template_rejected() {
    let template = Template::instance(
        "Controller",
        vec![Metric::new("x", 1_u8), Metric::new("x", 2_u8)],
    );
    assert_eq!(
        encode_metrics(&[Metric::new("ctrl", template)]),
        Err(CodecError::DuplicateMetric("x".into()))
    );
}
