//! Sparkplug B Edge of Network node.
//!
//! An [EoN] keeps a single node session with a broker: it publishes the birth
//! certificate on connect, periodically publishes metric values read from a
//! [ValueSource], dispatches inbound node commands to registered handlers and
//! keeps the NDEATH last will current across reconnects.
//!
//! See [EoNBuilder] on how to create a node.

mod birth;
mod builder;
mod config;
mod dispatcher;
mod error;
mod node;
mod observer;
mod publisher;
mod scheduler;
mod session;

pub use birth::{BirthMetric, BirthMetricError};
pub use builder::EoNBuilder;
pub use config::{ConfigError, NodeConfig};
pub use dispatcher::{CommandDispatcher, DispatchReport, Handler};
pub use error::*;
pub use node::{EoN, NodeHandle};
pub use observer::{DynNodeObserver, LogObserver, NodeObserver};
pub use publisher::{DynValueSource, NoSource, Report, Sample, SourceError, ValueSource};
pub use scheduler::{DynScheduler, PeriodicTask, Scheduler, TaskHandle, TickFuture, TokioScheduler};
pub use session::{NodeState, Transition};
