use log::{info, warn};
use spbnode_types::MetricId;

use crate::{error::DispatchError, publisher::SourceError, session::NodeState};

/// Hook notified of node events that are reported rather than returned.
///
/// Every method has an empty default so implementors only pick what they need.
pub trait NodeObserver: Send + Sync {
    fn on_state_change(&self, _from: NodeState, _to: NodeState) {}

    /// A command named a metric with no registered handler
    fn on_unknown_metric(&self, _id: &MetricId) {}

    /// A command could not be decoded or did not match its handler
    fn on_dispatch_error(&self, _error: &DispatchError) {}

    fn on_source_error(&self, _error: &SourceError) {}
}

pub type DynNodeObserver = dyn NodeObserver + Send + Sync;

impl<T: NodeObserver + ?Sized> NodeObserver for std::sync::Arc<T> {
    fn on_state_change(&self, from: NodeState, to: NodeState) {
        (**self).on_state_change(from, to)
    }

    fn on_unknown_metric(&self, id: &MetricId) {
        (**self).on_unknown_metric(id)
    }

    fn on_dispatch_error(&self, error: &DispatchError) {
        (**self).on_dispatch_error(error)
    }

    fn on_source_error(&self, error: &SourceError) {
        (**self).on_source_error(error)
    }
}

/// The default observer, routes every event to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl NodeObserver for LogObserver {
    fn on_state_change(&self, from: NodeState, to: NodeState) {
        info!("Node state change: {from} -> {to}");
    }

    fn on_unknown_metric(&self, id: &MetricId) {
        warn!("Received command for unknown metric {id:?} - ignoring");
    }

    fn on_dispatch_error(&self, error: &DispatchError) {
        warn!("Invalid command - ignoring: {error}");
    }

    fn on_source_error(&self, error: &SourceError) {
        warn!("Value source read failed, skipping tick: {error}");
    }
}
