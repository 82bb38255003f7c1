//! Node connecting to a TLS broker with client credentials.
//!
//! Usage: `tls-node <mqtt-tls.json>`

use std::{env, error::Error, time::Duration};

use log::LevelFilter;
use spbnode::{
    client_rumqtt as rumqtt,
    eon::{BirthMetric, EoNBuilder, Sample, SourceError},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Debug)
        .init();

    let path = env::args()
        .nth(1)
        .ok_or("usage: tls-node <mqtt-tls.json>")?;
    let opts: rumqtt::MqttOptions = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    let (eventloop, client) = rumqtt::EventLoop::from_options(opts, 0)?;

    let mut counter = 0_u64;
    let (eon, handle) = EoNBuilder::new(eventloop, client)
        .with_group_id("Cloud")
        .with_node_id("TlsNode")
        .with_publish_period(Duration::from_secs(5))
        .with_metric(BirthMetric::new_with_initial_value("Counter", counter))
        .with_value_source(move || -> Result<Vec<Sample>, SourceError> {
            counter = counter.wrapping_add(1);
            Ok(vec![Sample::new("Counter", counter)])
        })
        .build()?;

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            println!("Failed to register CTRL-C handler: {e}");
            return;
        }
        handle.cancel().await;
    });

    eon.run().await;
    Ok(())
}
