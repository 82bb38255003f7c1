use std::sync::{Arc, Mutex};

use log::{debug, error};
use spbnode_client::DynClient;
use spbnode_types::{topic::NodeTopic, utils::timestamp, Value};
use thiserror::Error;

use crate::{
    error::PublishError,
    observer::DynNodeObserver,
    session::{DataMessage, Session},
};

/// A value read for a birth metric, identified by name. `None` reports the metric as null.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub value: Option<Value>,
}

impl Sample {
    pub fn new<S: Into<String>, V: Into<Value>>(name: S, value: V) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    pub fn null<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Value source unavailable: {0}")]
    Unavailable(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// When a metric is included in the periodic NDATA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Report {
    /// Every tick
    #[default]
    Periodic,
    /// Only when the value differs from the last one published
    OnChange,
    /// Only when explicitly published through [NodeHandle::publish](crate::NodeHandle::publish)
    Never,
}

/// Provides the current metric values on every publish tick.
pub trait ValueSource: Send {
    fn read(&mut self) -> Result<Vec<Sample>, SourceError>;

    /// Called once when the node shuts down
    fn close(&mut self) {}
}

impl<F> ValueSource for F
where
    F: FnMut() -> Result<Vec<Sample>, SourceError> + Send,
{
    fn read(&mut self) -> Result<Vec<Sample>, SourceError> {
        self()
    }
}

pub type DynValueSource = dyn ValueSource + Send;

/// A source that never produces samples
#[derive(Debug, Default)]
pub struct NoSource;

impl ValueSource for NoSource {
    fn read(&mut self) -> Result<Vec<Sample>, SourceError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    Stale,
    SourceFailed,
    Idle,
    Published(u64),
    Failed,
}

/// Reads the value source and publishes NDATA
pub(crate) struct Publisher {
    pub(crate) session: Arc<Mutex<Session>>,
    pub(crate) source: Arc<Mutex<Box<DynValueSource>>>,
    pub(crate) client: Arc<DynClient>,
    pub(crate) topic: NodeTopic,
    pub(crate) observer: Arc<DynNodeObserver>,
}

impl Publisher {
    pub(crate) fn new(
        session: Arc<Mutex<Session>>,
        source: Box<DynValueSource>,
        client: Arc<DynClient>,
        topic: NodeTopic,
        observer: Arc<DynNodeObserver>,
    ) -> Self {
        Self {
            session,
            source: Arc::new(Mutex::new(source)),
            client,
            topic,
            observer,
        }
    }

    fn prepare_tick(&self, epoch: u64) -> Result<DataMessage, TickOutcome> {
        let mut session = self.session.lock().unwrap();
        if !session.is_current(epoch) {
            return Err(TickOutcome::Stale);
        }
        let samples = match self.source.lock().unwrap().read() {
            Ok(samples) => samples,
            Err(e) => {
                self.observer.on_source_error(&e);
                return Err(TickOutcome::SourceFailed);
            }
        };
        match session.data_payload(samples, false, timestamp()) {
            Ok(Some(data)) => Ok(data),
            Ok(None) => Err(TickOutcome::Idle),
            Err(e) => {
                error!("Unable to build NDATA: {e}");
                Err(TickOutcome::Failed)
            }
        }
    }

    /// One scheduled publish for the online period identified by `epoch`
    pub(crate) async fn tick(&self, epoch: u64) -> TickOutcome {
        let DataMessage {
            seq,
            payload,
            pending,
        } = match self.prepare_tick(epoch) {
            Ok(data) => data,
            Err(outcome) => return outcome,
        };
        match self
            .client
            .publish_node_message(self.topic.clone(), payload)
            .await
        {
            Ok(()) => {
                self.session.lock().unwrap().commit(pending);
                debug!("Published NDATA seq {seq}");
                TickOutcome::Published(seq)
            }
            Err(e) => {
                error!("Unable to publish NDATA: {e}");
                TickOutcome::Failed
            }
        }
    }

    /// Publish the given samples now, regardless of their report policy
    pub(crate) async fn publish_samples(&self, samples: Vec<Sample>) -> Result<(), PublishError> {
        if samples.is_empty() {
            return Err(PublishError::NoMetrics);
        }
        let data = {
            let mut session = self.session.lock().unwrap();
            session.data_payload(samples, true, timestamp())?
        };
        let Some(DataMessage {
            payload, pending, ..
        }) = data
        else {
            return Err(PublishError::NoMetrics);
        };
        self.client
            .publish_node_message(self.topic.clone(), payload)
            .await?;
        self.session.lock().unwrap().commit(pending);
        Ok(())
    }

    pub(crate) fn close_source(&self) {
        self.source.lock().unwrap().close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use spbnode_client::channel::{ChannelEventLoop, OutboundMessage};
    use spbnode_types::{codec::decode, topic::NodeMessage};

    use super::*;
    use crate::{
        birth::{BirthMetric, MetricTable},
        observer::{LogObserver, NodeObserver},
    };

    struct CountingObserver(AtomicUsize);

    impl NodeObserver for CountingObserver {
        fn on_source_error(&self, _error: &SourceError) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn setup(
        source: Box<DynValueSource>,
        observer: Arc<DynNodeObserver>,
    ) -> (
        Publisher,
        spbnode_client::channel::ChannelBroker,
        Arc<Mutex<Session>>,
    ) {
        let (_el, client, broker) = ChannelEventLoop::new();
        let table = MetricTable::new(vec![
            BirthMetric::new_with_initial_value("Temperature", 20.0_f64),
            BirthMetric::new_with_initial_value("Mode", "auto".to_string())
                .with_report(Report::OnChange),
        ])
        .unwrap();
        let session = Arc::new(Mutex::new(Session::new(table)));
        let publisher = Publisher::new(
            session.clone(),
            source,
            Arc::new(client),
            NodeTopic::new("G", NodeMessage::NData, "N"),
            observer,
        );
        (publisher, broker, session)
    }

    fn fixed(samples: Vec<Sample>) -> Box<DynValueSource> {
        Box::new(move || -> Result<Vec<Sample>, SourceError> { Ok(samples.clone()) })
    }

    fn go_online(session: &Arc<Mutex<Session>>) -> u64 {
        let mut s = session.lock().unwrap();
        s.begin_connect().unwrap();
        s.go_online(0).unwrap();
        let epoch = s.epoch();
        assert!(s.birth_published(epoch));
        epoch
    }

    #[tokio::test]
    async fn tick_publishes_due_metrics() {
        let source = fixed(vec![
            Sample::new("Temperature", 21.0_f64),
            Sample::new("Mode", "auto"),
        ]);
        let (publisher, mut broker, session) = setup(source, Arc::new(LogObserver));
        let epoch = go_online(&session);

        assert_eq!(publisher.tick(epoch).await, TickOutcome::Published(1));
        match broker.rx_outbound.recv().await.unwrap() {
            OutboundMessage::NodeMessage { topic, payload } => {
                assert_eq!(topic.topic, "spBv1.0/G/NDATA/N");
                let payload = decode(&payload).unwrap();
                assert_eq!(payload.seq, Some(1));
                assert_eq!(payload.metrics.len(), 1);
                assert_eq!(payload.metrics[0].alias, Some(1));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn stale_epoch_does_nothing() {
        let (publisher, mut broker, session) = setup(
            fixed(vec![Sample::new("Temperature", 1.0_f64)]),
            Arc::new(LogObserver),
        );
        let epoch = go_online(&session);
        session.lock().unwrap().disconnected().unwrap();
        assert_eq!(publisher.tick(epoch).await, TickOutcome::Stale);
        assert!(broker.rx_outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn source_error_skips_tick() {
        let observer = Arc::new(CountingObserver(AtomicUsize::new(0)));
        let (publisher, mut broker, session) = setup(
            Box::new(|| -> Result<Vec<Sample>, SourceError> {
                Err(SourceError::Unavailable("sensor".into()))
            }),
            observer.clone(),
        );
        let epoch = go_online(&session);
        assert_eq!(publisher.tick(epoch).await, TickOutcome::SourceFailed);
        assert_eq!(observer.0.load(Ordering::SeqCst), 1);
        assert!(broker.rx_outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn nothing_due_keeps_seq() {
        let (publisher, _broker, session) =
            setup(fixed(vec![Sample::new("Mode", "auto")]), Arc::new(LogObserver));
        let epoch = go_online(&session);
        assert_eq!(publisher.tick(epoch).await, TickOutcome::Idle);
        assert_eq!(session.lock().unwrap().seq(), 0);
    }

    #[tokio::test]
    async fn rejected_change_stays_due() {
        let (publisher, broker, session) =
            setup(fixed(vec![Sample::new("Mode", "manual")]), Arc::new(LogObserver));
        let epoch = go_online(&session);
        drop(broker);
        assert_eq!(publisher.tick(epoch).await, TickOutcome::Failed);
        assert_eq!(publisher.tick(epoch).await, TickOutcome::Failed);
    }

    #[tokio::test]
    async fn accepted_change_is_not_repeated() {
        let (publisher, mut broker, session) =
            setup(fixed(vec![Sample::new("Mode", "manual")]), Arc::new(LogObserver));
        let epoch = go_online(&session);
        assert_eq!(publisher.tick(epoch).await, TickOutcome::Published(1));
        assert_eq!(publisher.tick(epoch).await, TickOutcome::Idle);
        assert!(broker.rx_outbound.try_recv().is_ok());
        assert!(broker.rx_outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn forced_publish_requires_online() {
        let (publisher, _broker, session) = setup(Box::new(NoSource), Arc::new(LogObserver));
        assert!(matches!(
            publisher
                .publish_samples(vec![Sample::new("Mode", "auto")])
                .await,
            Err(PublishError::State(_))
        ));
        go_online(&session);
        assert!(publisher
            .publish_samples(vec![Sample::new("Mode", "auto")])
            .await
            .is_ok());
        assert!(matches!(
            publisher.publish_samples(vec![]).await,
            Err(PublishError::NoMetrics)
        ));
    }
}
