use spbnode_client::TransportError;
use spbnode_types::{utils::NameError, CodecError, DataType, MetricId};
use thiserror::Error;

use crate::{birth::BirthMetricError, session::NodeState};

/// A lifecycle transition that is not valid from the current state
#[derive(Error, Debug, PartialEq)]
pub enum StateError {
    #[error("Cannot {transition} while {from}")]
    InvalidTransition {
        from: NodeState,
        transition: &'static str,
    },
    #[error("The node is not online")]
    Offline,
    #[error("The node's birth certificate has not been published yet")]
    BirthPending,
    #[error("Unable to encode birth certificate: {0}")]
    Birth(CodecError),
}

#[derive(Error, Debug, PartialEq)]
pub enum RegistrationError {
    #[error("A handler for {0} is already registered")]
    Duplicate(String),
    #[error("Invalid metric name: {0}")]
    InvalidName(String),
}

/// Errors produced while routing an inbound command
#[derive(Error, Debug, PartialEq)]
pub enum DispatchError {
    #[error("Unable to decode command payload: {0}")]
    Decode(#[from] CodecError),
    #[error("No handler registered for {0:?}")]
    UnknownMetric(MetricId),
    #[error("Metric {metric} has datatype {actual:?}, handler expects {expected:?}")]
    TypeMismatch {
        metric: String,
        expected: DataType,
        actual: DataType,
    },
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("group id must be provided")]
    MissingGroupId,
    #[error("node id must be provided")]
    MissingNodeId,
    #[error("Invalid identifier: {0}")]
    InvalidName(#[from] NameError),
    #[error("Invalid birth metric: {0}")]
    BirthMetric(#[from] BirthMetricError),
    #[error("Invalid command handler: {0}")]
    Registration(#[from] RegistrationError),
    #[error("Birth certificate cannot be encoded: {0}")]
    Codec(#[from] CodecError),
    #[error("publish period must be greater than zero")]
    ZeroPublishPeriod,
}

/// Failure to publish metrics on demand
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("No metrics provided")]
    NoMetrics,
    #[error("{0}")]
    State(#[from] StateError),
    #[error("Encode error: {0}")]
    Codec(#[from] CodecError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
