//! Simulated BME280 environmental sensor published as a Sparkplug node.
//!
//! Usage: `bme280-node [node.json] [mqtt.json]`

use std::{env, error::Error};

use log::{info, LevelFilter};
use spbnode::{
    client_rumqtt as rumqtt,
    eon::{
        BirthMetric, EoNBuilder, NodeConfig, NodeHandle, Report, Sample, SourceError, ValueSource,
    },
};

struct SimulatedBme280 {
    tick: u64,
}

impl ValueSource for SimulatedBme280 {
    fn read(&mut self) -> Result<Vec<Sample>, SourceError> {
        self.tick += 1;
        let phase = (self.tick as f64 / 30.0).sin();
        Ok(vec![
            Sample::new("Temperature", 21.0 + 2.0 * phase),
            Sample::new("Humidity", 45.0 - 5.0 * phase),
            Sample::new("Pressure", 1013.25 + phase),
            Sample::new(
                "Mode",
                match self.tick % 60 < 30 {
                    true => "normal",
                    false => "forced",
                },
            ),
        ])
    }

    fn close(&mut self) {
        info!("Sensor closed after {} reads", self.tick);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let mut args = env::args().skip(1);
    let config = match args.next() {
        Some(path) => NodeConfig::from_file(path)?,
        None => NodeConfig::new("BME280", "Node1"),
    };
    let opts = match args.next() {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => rumqtt::MqttOptions::new("bme280-node1", "localhost", 1883),
    };

    let (eventloop, client) = rumqtt::EventLoop::from_options(opts, 0)?;

    let (eon, handle) = EoNBuilder::new(eventloop, client)
        .with_config(config)
        .with_metric(BirthMetric::new_with_initial_value("Temperature", 0.0_f64))
        .with_metric(BirthMetric::new_with_initial_value("Humidity", 0.0_f64))
        .with_metric(BirthMetric::new_with_initial_value("Pressure", 0.0_f64))
        .with_metric(
            BirthMetric::new_with_initial_value("Mode", "normal".to_string())
                .with_report(Report::OnChange),
        )
        .with_metric(
            BirthMetric::new_with_initial_value("Serial", 0x60_u32).with_report(Report::Never),
        )
        .with_value_source(SimulatedBme280 { tick: 0 })
        .with_command("Setpoint", |node: &NodeHandle, value: Option<f64>| {
            info!("Setpoint command: {value:?}, node state {}", node.state());
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
