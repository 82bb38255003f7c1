//! Sparkplug B Edge of Network node framework.
//!
//! Re-exports the workspace crates under a single name.
//!
//! # Feature Flags
//!
//! - `eon`: the edge node ([eon]). Enabled by default.
//! - `rumqtt-client`: the rumqttc transport ([client_rumqtt]). Enabled by default.
//! - `channel-client`: the channel based transport used for testing.

#[cfg(feature = "eon")]
pub use spbnode_eon as eon;
pub use spbnode_types as types;

pub use spbnode_client as client;

#[cfg(feature = "rumqtt-client")]
pub use spbnode_client_rumqtt as client_rumqtt;
