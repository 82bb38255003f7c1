//! A [spbnode_client::Client] and [spbnode_client::EventLoop] implementation backed by [rumqttc]'s MQTT v5 client.

mod client;
mod options;

pub use client::{Client, EventLoop};
pub use options::{ConnectionProperties, Credentials, MqttOptions, OptionsError, TlsOptions};
