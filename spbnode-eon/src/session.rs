//! Node lifecycle and sequence bookkeeping.
//!
//! A [Session] is owned behind a mutex and shared by the node task, the
//! publisher and the [NodeHandle](crate::NodeHandle). Every transition bumps or
//! checks `epoch` so work started for one connection is discarded once that
//! connection has gone away.

use std::{collections::HashMap, fmt};

use spbnode_types::{
    codec,
    constants::BDSEQ,
    utils::{next_seq, timestamp},
    CodecError, Metric, Payload,
};

use crate::{
    birth::{MetricTable, Reported},
    error::{PublishError, StateError},
    publisher::Sample,
    scheduler::TaskHandle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Disconnected,
    Connecting,
    Online,
    /// Online, but the last inbound message broke the protocol
    Degraded,
    Reconnecting,
    /// Shut down, no further transitions are possible
    Shutdown,
}

impl NodeState {
    /// Online or Degraded. The node holds a published birth certificate.
    pub fn is_active(&self) -> bool {
        matches!(self, NodeState::Online | NodeState::Degraded)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Disconnected => "Disconnected",
            NodeState::Connecting => "Connecting",
            NodeState::Online => "Online",
            NodeState::Degraded => "Degraded",
            NodeState::Reconnecting => "Reconnecting",
            NodeState::Shutdown => "Disconnected (terminal)",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: NodeState,
    pub to: NodeState,
}

impl Transition {
    pub fn is_change(&self) -> bool {
        self.from != self.to
    }
}

/// An encoded NDATA. Its values count as published once [Session::commit] is called.
pub(crate) struct DataMessage {
    pub(crate) seq: u64,
    pub(crate) payload: Vec<u8>,
    pub(crate) pending: PendingReport,
}

pub(crate) struct PendingReport {
    epoch: u64,
    reported: Vec<Reported>,
}

pub(crate) struct Session {
    state: NodeState,
    seq: u64,
    bdseq: u64,
    epoch: u64,
    birth: Option<Vec<u8>>,
    /// A birth certificate of this epoch is being handed to the transport
    birth_pending: bool,
    metrics: MetricTable,
    publish_task: Option<TaskHandle>,
}

impl Session {
    pub(crate) fn new(metrics: MetricTable) -> Self {
        Self {
            state: NodeState::Disconnected,
            seq: 0,
            bdseq: 0,
            epoch: 0,
            birth: None,
            birth_pending: false,
            metrics,
            publish_task: None,
        }
    }

    pub(crate) fn state(&self) -> NodeState {
        self.state
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    #[cfg(test)]
    pub(crate) fn bdseq(&self) -> u64 {
        self.bdseq
    }

    #[cfg(test)]
    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub(crate) fn aliases(&self) -> &HashMap<u64, String> {
        self.metrics.aliases()
    }

    /// True if `epoch` is the current online period and its birth has gone out
    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch && self.state.is_active() && !self.birth_pending
    }

    /// Attach the publisher loop started for `epoch`.
    ///
    /// Returns false, cancelling the task, if that online period has already ended.
    pub(crate) fn set_publish_task(&mut self, epoch: u64, task: TaskHandle) -> bool {
        if !self.is_current(epoch) {
            task.cancel();
            return false;
        }
        if let Some(old) = self.publish_task.replace(task) {
            old.cancel();
        }
        true
    }

    pub(crate) fn has_publish_task(&self) -> bool {
        self.publish_task
            .as_ref()
            .is_some_and(|task| !task.is_cancelled())
    }

    fn cancel_publish_task(&mut self) {
        if let Some(task) = self.publish_task.take() {
            task.cancel();
        }
    }

    fn transition(&mut self, to: NodeState) -> Transition {
        let from = self.state;
        self.state = to;
        Transition { from, to }
    }

    fn invalid(&self, transition: &'static str) -> StateError {
        StateError::InvalidTransition {
            from: self.state,
            transition,
        }
    }

    pub(crate) fn begin_connect(&mut self) -> Result<Transition, StateError> {
        match self.state {
            NodeState::Disconnected | NodeState::Reconnecting => {
                Ok(self.transition(NodeState::Connecting))
            }
            _ => Err(self.invalid("connect")),
        }
    }

    pub(crate) fn connect_failed(&mut self) -> Result<Transition, StateError> {
        match self.state {
            NodeState::Connecting | NodeState::Reconnecting => {
                Ok(self.transition(NodeState::Reconnecting))
            }
            _ => Err(self.invalid("fail connecting")),
        }
    }

    /// The transport connected. Starts a new epoch and returns the encoded NBIRTH.
    ///
    /// No NDATA is produced until [Session::birth_published] confirms the birth went out.
    pub(crate) fn go_online(
        &mut self,
        timestamp: u64,
    ) -> Result<(Transition, Vec<u8>), StateError> {
        if self.state != NodeState::Connecting {
            return Err(self.invalid("go online"));
        }
        let birth = self.birth_payload(timestamp).map_err(StateError::Birth)?;
        self.cancel_publish_task();
        self.seq = 0;
        self.epoch += 1;
        self.birth = Some(birth.clone());
        self.birth_pending = true;
        Ok((self.transition(NodeState::Online), birth))
    }

    /// The birth certificate of `epoch` was accepted by the transport
    pub(crate) fn birth_published(&mut self, epoch: u64) -> bool {
        if self.epoch != epoch || !self.state.is_active() {
            return false;
        }
        self.birth_pending = false;
        true
    }

    /// Publishing the birth certificate of `epoch` failed. The session is over.
    pub(crate) fn birth_failed(&mut self, epoch: u64) -> Result<Transition, StateError> {
        if self.epoch != epoch || !self.birth_pending || !self.state.is_active() {
            return Err(self.invalid("fail birth"));
        }
        Ok(self.end_session())
    }

    /// Encode a birth certificate for the current bdSeq and metric values
    pub(crate) fn birth_payload(&mut self, timestamp: u64) -> Result<Vec<u8>, CodecError> {
        let metrics = self.metrics.birth_metrics(self.bdseq, timestamp);
        codec::encode(&Payload::new(timestamp, Some(0), metrics))
    }

    fn end_session(&mut self) -> Transition {
        self.cancel_publish_task();
        self.epoch += 1;
        self.seq = 0;
        self.bdseq = next_seq(self.bdseq);
        self.birth = None;
        self.birth_pending = false;
        self.transition(NodeState::Reconnecting)
    }

    /// The transport connection was lost
    pub(crate) fn disconnected(&mut self) -> Result<Transition, StateError> {
        if !self.state.is_active() {
            return Err(self.invalid("disconnect"));
        }
        Ok(self.end_session())
    }

    /// Stop the publisher loop, reset seq and return the retained birth certificate for
    /// republishing. Starts a new epoch that is pending until the birth is published.
    pub(crate) fn rebirth(&mut self) -> Result<(Transition, Vec<u8>), StateError> {
        if !self.state.is_active() {
            return Err(StateError::Offline);
        }
        let birth = self.birth.clone().ok_or(StateError::Offline)?;
        self.cancel_publish_task();
        self.epoch += 1;
        self.seq = 0;
        self.birth_pending = true;
        self.metrics.restore_birth();
        Ok((self.transition(NodeState::Online), birth))
    }

    pub(crate) fn protocol_violation(&mut self) -> Result<Transition, StateError> {
        if !self.state.is_active() {
            return Err(self.invalid("record a protocol violation"));
        }
        Ok(self.transition(NodeState::Degraded))
    }

    pub(crate) fn valid_message(&mut self) -> Result<Transition, StateError> {
        if !self.state.is_active() {
            return Err(self.invalid("accept a message"));
        }
        Ok(self.transition(NodeState::Online))
    }

    pub(crate) fn shutdown(&mut self) -> Transition {
        self.cancel_publish_task();
        self.epoch += 1;
        self.birth = None;
        self.birth_pending = false;
        self.transition(NodeState::Shutdown)
    }

    /// Encoded NDEATH carrying the current bdSeq
    pub(crate) fn death_payload(&self) -> Result<Vec<u8>, CodecError> {
        let payload = Payload {
            timestamp: Some(timestamp()),
            seq: None,
            metrics: vec![Metric::new(BDSEQ, self.bdseq as i64)],
        };
        codec::encode(&payload)
    }

    /// Record samples and encode an NDATA with the metrics that are due.
    ///
    /// Returns `None` if nothing is due, in which case no seq is consumed.
    pub(crate) fn data_payload(
        &mut self,
        samples: Vec<Sample>,
        force: bool,
        timestamp: u64,
    ) -> Result<Option<DataMessage>, PublishError> {
        if !self.state.is_active() {
            return Err(StateError::Offline.into());
        }
        if self.birth_pending {
            return Err(StateError::BirthPending.into());
        }
        let (metrics, reported) = self.metrics.data_metrics(samples, timestamp, force);
        if metrics.is_empty() {
            return Ok(None);
        }
        let seq = next_seq(self.seq);
        let payload = codec::encode(&Payload::new(timestamp, Some(seq), metrics))?;
        self.seq = seq;
        Ok(Some(DataMessage {
            seq,
            payload,
            pending: PendingReport {
                epoch: self.epoch,
                reported,
            },
        }))
    }

    /// The transport accepted an NDATA. Ignored if its online period has since ended.
    pub(crate) fn commit(&mut self, pending: PendingReport) {
        if pending.epoch == self.epoch {
            self.metrics.mark_published(pending.reported);
        }
    }
}

#[cfg(test)]
mod tests {
    use spbnode_types::{codec::decode, constants::NODE_CONTROL_REBIRTH, Value};

    use super::*;
    use crate::birth::BirthMetric;

    fn session() -> Session {
        let table = MetricTable::new(vec![BirthMetric::new_with_initial_value(
            "Temperature",
            20.5_f64,
        )])
        .unwrap();
        Session::new(table)
    }

    fn birth(s: &mut Session, timestamp: u64) -> Vec<u8> {
        s.begin_connect().unwrap();
        let (_, birth) = s.go_online(timestamp).unwrap();
        assert!(s.birth_published(s.epoch()));
        birth
    }

    fn online() -> (Session, Vec<u8>) {
        let mut s = session();
        let birth = birth(&mut s, 1);
        (s, birth)
    }

    fn bdseq_of(bytes: &[u8]) -> Value {
        let payload = decode(bytes).unwrap();
        payload
            .metrics
            .into_iter()
            .find(|m| m.name.as_deref() == Some(BDSEQ))
            .and_then(|m| m.value)
            .unwrap()
    }

    #[test]
    fn birth_on_connect() {
        let (s, birth) = online();
        assert_eq!(s.state(), NodeState::Online);
        assert_eq!(s.epoch(), 1);
        let payload = decode(&birth).unwrap();
        assert_eq!(payload.seq, Some(0));
        assert_eq!(bdseq_of(&birth), Value::Int64(0));
        assert_eq!(
            payload.metrics[1],
            Metric::new(NODE_CONTROL_REBIRTH, false).with_timestamp(1)
        );
    }

    #[test]
    fn invalid_transitions_leave_state_untouched() {
        let mut s = session();
        assert_eq!(
            s.go_online(1).unwrap_err(),
            StateError::InvalidTransition {
                from: NodeState::Disconnected,
                transition: "go online"
            }
        );
        assert!(s.disconnected().is_err());
        assert_eq!(s.rebirth().unwrap_err(), StateError::Offline);
        assert_eq!(s.state(), NodeState::Disconnected);
        assert_eq!(s.epoch(), 0);
    }

    #[test]
    fn disconnect_increments_bdseq() {
        let (mut s, _) = online();
        s.data_payload(vec![Sample::new("Temperature", 1.0_f64)], false, 2)
            .unwrap();
        assert_eq!(s.seq(), 1);
        let t = s.disconnected().unwrap();
        assert_eq!(t.to, NodeState::Reconnecting);
        assert_eq!(s.bdseq(), 1);
        assert_eq!(s.seq(), 0);
        assert_eq!(bdseq_of(&s.death_payload().unwrap()), Value::Int64(1));
        assert!(s.go_online(3).is_err());
        let birth = birth(&mut s, 3);
        assert_eq!(bdseq_of(&birth), Value::Int64(1));
        assert_eq!(s.epoch(), 3);
    }

    #[test]
    fn bdseq_wraps() {
        let (mut s, _) = online();
        for _ in 0..256 {
            s.disconnected().unwrap();
            birth(&mut s, 1);
        }
        assert_eq!(s.bdseq(), 0);
    }

    #[test]
    fn seq_wraps_after_255() {
        let (mut s, _) = online();
        let mut last = 0;
        for _ in 0..256 {
            let data = s
                .data_payload(vec![Sample::new("Temperature", 1.0_f64)], false, 2)
                .unwrap()
                .unwrap();
            last = data.seq;
        }
        assert_eq!(last, 0);
    }

    #[test]
    fn rebirth_returns_identical_bytes() {
        let (mut s, birth) = online();
        s.data_payload(vec![Sample::new("Temperature", 9.0_f64)], false, 2)
            .unwrap();
        let (_, again) = s.rebirth().unwrap();
        assert_eq!(again, birth);
        assert_eq!(s.seq(), 0);
    }

    #[test]
    fn rebirth_holds_data_until_published() {
        let (mut s, _) = online();
        let (task, rx) = TaskHandle::new_pair();
        assert!(s.set_publish_task(1, task));
        s.rebirth().unwrap();
        assert!(*rx.borrow());
        assert!(!s.is_current(1));
        assert!(!s.is_current(2));
        assert!(matches!(
            s.data_payload(vec![Sample::new("Temperature", 1.0_f64)], true, 2),
            Err(PublishError::State(StateError::BirthPending))
        ));

        assert!(s.birth_published(2));
        assert!(s.is_current(2));
        let data = s
            .data_payload(vec![Sample::new("Temperature", 1.0_f64)], true, 2)
            .unwrap()
            .unwrap();
        assert_eq!(data.seq, 1);
    }

    #[test]
    fn failed_birth_ends_session() {
        let mut s = session();
        s.begin_connect().unwrap();
        s.go_online(1).unwrap();
        assert!(s.data_payload(vec![], true, 1).is_err());
        let t = s.birth_failed(1).unwrap();
        assert_eq!((t.from, t.to), (NodeState::Online, NodeState::Reconnecting));
        assert_eq!(s.bdseq(), 1);
        assert_eq!(s.epoch(), 2);
        assert!(!s.birth_published(1));
        assert_eq!(s.rebirth().unwrap_err(), StateError::Offline);
        assert!(s.birth_failed(2).is_err());

        // only a pending birth can fail
        let (mut s, _) = online();
        assert!(s.birth_failed(1).is_err());
        assert_eq!(s.state(), NodeState::Online);
    }

    #[test]
    fn reconnect_passes_through_connecting() {
        let (mut s, _) = online();
        s.disconnected().unwrap();
        assert!(s.go_online(2).is_err());
        let t = s.begin_connect().unwrap();
        assert_eq!((t.from, t.to), (NodeState::Reconnecting, NodeState::Connecting));
        let (t, _) = s.go_online(2).unwrap();
        assert_eq!((t.from, t.to), (NodeState::Connecting, NodeState::Online));
    }

    #[test]
    fn degraded_and_recovery() {
        let (mut s, _) = online();
        assert_eq!(s.protocol_violation().unwrap().to, NodeState::Degraded);
        assert!(s.is_current(1));
        assert_eq!(s.valid_message().unwrap().to, NodeState::Online);
        s.protocol_violation().unwrap();
        assert_eq!(s.rebirth().unwrap().0.to, NodeState::Online);
    }

    #[test]
    fn disconnect_cancels_publish_task() {
        let (mut s, _) = online();
        let (task, rx) = TaskHandle::new_pair();
        assert!(s.set_publish_task(1, task));
        assert!(s.has_publish_task());
        s.disconnected().unwrap();
        assert!(*rx.borrow());
        assert!(!s.has_publish_task());

        let (task, rx) = TaskHandle::new_pair();
        assert!(!s.set_publish_task(1, task));
        assert!(*rx.borrow());
    }

    #[test]
    fn shutdown_is_terminal() {
        let (mut s, _) = online();
        let t = s.shutdown();
        assert_eq!(t.from, NodeState::Online);
        assert!(!s.is_current(1));
        assert!(s.begin_connect().is_err());
        assert_eq!(s.state().to_string(), "Disconnected (terminal)");
        assert!(s
            .data_payload(vec![Sample::new("Temperature", 1.0_f64)], false, 2)
            .is_err());
    }
}
