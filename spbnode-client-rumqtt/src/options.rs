use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use rumqttc::{
    v5::{mqttbytes::v5::ConnectProperties, MqttOptions as RuMqttOptions},
    TlsConfiguration, Transport,
};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("Unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("client_cert_path and client_key_path must be provided together")]
    PartialClientAuth,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConnectionProperties {
    pub receive_maximum: Option<u16>,
    pub max_packet_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// TLS material, given as paths to PEM files.
///
/// The CA is required. Client certificate and key enable mutual TLS and
/// must be supplied together.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TlsOptions {
    pub ca_path: PathBuf,
    #[serde(default)]
    pub client_cert_path: Option<PathBuf>,
    #[serde(default)]
    pub client_key_path: Option<PathBuf>,
    #[serde(default)]
    pub alpn: Option<Vec<String>>,
}

fn default_port() -> u16 {
    1883
}

fn default_keepalive() -> u64 {
    30
}

fn default_cap() -> usize {
    10
}

/// Transport settings for connecting a node to its broker
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MqttOptions {
    pub broker_addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub client_id: String,
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,
    #[serde(default = "default_cap")]
    pub request_channel_capacity: usize,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub tls: Option<TlsOptions>,
    #[serde(default)]
    pub connect_properties: Option<ConnectionProperties>,
}

impl MqttOptions {
    pub fn new<S: Into<String>, S1: Into<String>>(client_id: S, addr: S1, port: u16) -> Self {
        Self {
            broker_addr: addr.into(),
            port,
            client_id: client_id.into(),
            keepalive_secs: default_keepalive(),
            request_channel_capacity: default_cap(),
            credentials: None,
            tls: None,
            connect_properties: None,
        }
    }

    pub fn with_credentials<S: Into<String>, S1: Into<String>>(
        mut self,
        username: S,
        password: S1,
    ) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }
}

fn read(path: &Path) -> Result<Vec<u8>, OptionsError> {
    std::fs::read(path).map_err(|source| OptionsError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl TlsOptions {
    fn to_transport(&self) -> Result<Transport, OptionsError> {
        let ca = read(&self.ca_path)?;
        let client_auth = match (&self.client_cert_path, &self.client_key_path) {
            (Some(cert), Some(key)) => Some((read(cert)?, read(key)?)),
            (None, None) => None,
            _ => return Err(OptionsError::PartialClientAuth),
        };
        let alpn = self
            .alpn
            .as_ref()
            .map(|protocols| protocols.iter().map(|p| p.as_bytes().to_vec()).collect());
        Ok(Transport::tls_with_config(TlsConfiguration::Simple {
            ca,
            alpn,
            client_auth,
        }))
    }
}

impl TryFrom<MqttOptions> for RuMqttOptions {
    type Error = OptionsError;

    fn try_from(value: MqttOptions) -> Result<Self, Self::Error> {
        let mut options = RuMqttOptions::new(value.client_id, value.broker_addr, value.port);
        options.set_keep_alive(Duration::from_secs(value.keepalive_secs));
        if let Some(credentials) = value.credentials {
            options.set_credentials(credentials.username, credentials.password);
        }
        if let Some(tls) = &value.tls {
            options.set_transport(tls.to_transport()?);
        }
        if let Some(props) = value.connect_properties {
            let mut connect_properties = ConnectProperties::new();
            connect_properties.receive_maximum = props.receive_maximum;
            connect_properties.max_packet_size = props.max_packet_size;
            options.set_connect_properties(connect_properties);
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_json() {
        let options: MqttOptions = serde_json::from_str(
            r#"{ "broker_addr": "localhost", "client_id": "node1" }"#,
        )
        .unwrap();
        assert_eq!(options, MqttOptions::new("node1", "localhost", 1883));
        assert_eq!(options.keepalive_secs, 30);
    }

    #[test]
    fn tls_from_json() {
        let options: MqttOptions = serde_json::from_str(
            r#"{
                "broker_addr": "example.iot.amazonaws.com",
                "port": 8883,
                "client_id": "node1",
                "credentials": { "username": "u", "password": "p" },
                "tls": {
                    "ca_path": "certs/ca.pem",
                    "client_cert_path": "certs/client.pem",
                    "client_key_path": "certs/client.key",
                    "alpn": ["x-amzn-mqtt-ca"]
                }
            }"#,
        )
        .unwrap();
        let tls = options.tls.unwrap();
        assert_eq!(tls.ca_path, PathBuf::from("certs/ca.pem"));
        assert_eq!(tls.alpn, Some(vec!["x-amzn-mqtt-ca".to_string()]));
        assert_eq!(options.credentials.unwrap().username, "u");
    }

    #[test]
    fn partial_client_auth_rejected() {
        let dir = std::env::temp_dir().join("spbnode-options-test-ca.pem");
        std::fs::write(&dir, b"ca").unwrap();
        let tls = TlsOptions {
            ca_path: dir.clone(),
            client_cert_path: Some(dir.clone()),
            client_key_path: None,
            alpn: None,
        };
        assert!(matches!(
            tls.to_transport(),
            Err(OptionsError::PartialClientAuth)
        ));
        let _ = std::fs::remove_file(dir);
    }

    #[test]
    fn missing_ca_reported() {
        let options = MqttOptions::new("node1", "localhost", 8883).with_tls(TlsOptions {
            ca_path: PathBuf::from("/nonexistent/ca.pem"),
            client_cert_path: None,
            client_key_path: None,
            alpn: None,
        });
        assert!(matches!(
            RuMqttOptions::try_from(options),
            Err(OptionsError::Io { .. })
        ));
    }

    #[test]
    fn plain_options_convert() {
        let options = MqttOptions::new("node1", "localhost", 1883).with_credentials("u", "p");
        let ru = RuMqttOptions::try_from(options).unwrap();
        assert_eq!(ru.keep_alive(), Duration::from_secs(30));
        assert_eq!(ru.client_id(), "node1");
    }
}
