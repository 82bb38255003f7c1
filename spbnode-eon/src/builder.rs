use std::{sync::Arc, time::Duration};

use spbnode_client::{Client, DynClient, DynEventLoop, EventLoop};
use spbnode_types::{
    constants::NODE_CONTROL_REBIRTH,
    traits,
    utils::{timestamp, validate_name},
    DataType, Value,
};

use crate::{
    birth::{BirthMetric, MetricTable},
    config::NodeConfig,
    dispatcher::CommandDispatcher,
    error::{BuildError, RegistrationError},
    node::{rebirth_handler, NodeParts, NodeSettings},
    observer::{DynNodeObserver, LogObserver, NodeObserver},
    publisher::{DynValueSource, NoSource, ValueSource},
    scheduler::{DynScheduler, Scheduler, TokioScheduler},
    session::Session,
    EoN, NodeHandle,
};

/// A builder for creating and configuring Edge of Network (EoN) instances.
pub struct EoNBuilder {
    group_id: Option<String>,
    node_id: Option<String>,
    eventloop_client: (Box<DynEventLoop>, Arc<DynClient>),
    metrics: Vec<BirthMetric>,
    source: Box<DynValueSource>,
    scheduler: Arc<DynScheduler>,
    publish_period: Duration,
    rebirth_cooldown: Duration,
    primary_host_id: Option<String>,
    observer: Arc<DynNodeObserver>,
    dispatcher: CommandDispatcher<NodeHandle>,
    registration_error: Option<RegistrationError>,
}

impl EoNBuilder {
    /// Creates a new builder with the specified event loop and client.
    ///
    /// Publishes every second from a source that produces no samples until configured otherwise.
    pub fn new<E: EventLoop + Send + 'static, C: Client + Send + Sync + 'static>(
        eventloop: E,
        client: C,
    ) -> Self {
        Self {
            group_id: None,
            node_id: None,
            eventloop_client: (Box::new(eventloop), Arc::new(client)),
            metrics: Vec::new(),
            source: Box::new(NoSource),
            scheduler: Arc::new(TokioScheduler),
            publish_period: Duration::from_millis(1000),
            rebirth_cooldown: Duration::from_millis(5000),
            primary_host_id: None,
            observer: Arc::new(LogObserver),
            dispatcher: CommandDispatcher::new(),
            registration_error: None,
        }
    }

    /// Sets the group ID for the EoN instance.
    pub fn with_group_id<S: Into<String>>(mut self, group_id: S) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Sets the node ID for the EoN instance.
    ///
    /// The node ID uniquely identifies this node within its group.
    pub fn with_node_id<S: Into<String>>(mut self, node_id: S) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    /// Apply every setting of a [NodeConfig]
    pub fn with_config(self, config: NodeConfig) -> Self {
        let mut builder = self
            .with_group_id(config.group_id.clone())
            .with_node_id(config.node_id.clone())
            .with_publish_period(config.publish_period())
            .with_rebirth_cooldown(config.rebirth_cooldown());
        builder.primary_host_id = config.primary_host_id;
        builder
    }

    /// Add a metric to the node's birth certificate. Metrics are born in the order they are added.
    pub fn with_metric(mut self, metric: BirthMetric) -> Self {
        self.metrics.push(metric);
        self
    }

    pub fn with_value_source<S: ValueSource + 'static>(mut self, source: S) -> Self {
        self.source = Box::new(source);
        self
    }

    pub fn with_scheduler<S: Scheduler + 'static>(mut self, scheduler: S) -> Self {
        self.scheduler = Arc::new(scheduler);
        self
    }

    pub fn with_publish_period(mut self, period: Duration) -> Self {
        self.publish_period = period;
        self
    }

    /// Minimum time between two accepted `Node Control/Rebirth` commands
    pub fn with_rebirth_cooldown(mut self, cooldown: Duration) -> Self {
        self.rebirth_cooldown = cooldown;
        self
    }

    pub fn with_primary_host_id<S: Into<String>>(mut self, host_id: S) -> Self {
        self.primary_host_id = Some(host_id.into());
        self
    }

    pub fn with_observer<O: NodeObserver + 'static>(mut self, observer: O) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    fn record(&mut self, result: Result<(), RegistrationError>) {
        if let Err(e) = result {
            self.registration_error.get_or_insert(e);
        }
    }

    /// Register a handler for commands targeting the metric `name`.
    ///
    /// Registration errors are reported by [EoNBuilder::build].
    pub fn with_command<S, T, F>(mut self, name: S, handler: F) -> Self
    where
        S: Into<String>,
        T: traits::MetricValue + 'static,
        F: Fn(&NodeHandle, Option<T>) + Send + Sync + 'static,
    {
        let name = name.into();
        let result = match name == NODE_CONTROL_REBIRTH {
            true => Err(RegistrationError::Duplicate(name)),
            false => self.dispatcher.register(name, handler),
        };
        self.record(result);
        self
    }

    /// Register a handler receiving the untyped command value
    pub fn with_raw_command<S, F>(mut self, name: S, datatype: DataType, handler: F) -> Self
    where
        S: Into<String>,
        F: Fn(&NodeHandle, DataType, Option<Value>) + Send + Sync + 'static,
    {
        let name = name.into();
        let result = match name == NODE_CONTROL_REBIRTH {
            true => Err(RegistrationError::Duplicate(name)),
            false => self.dispatcher.register_raw(name, datatype, handler),
        };
        self.record(result);
        self
    }

    /// Builds the EoN instance with the configured settings.
    ///
    /// Returns an error if required configuration is missing, an identifier is
    /// invalid, a birth metric is rejected or the birth certificate cannot be encoded.
    pub fn build(mut self) -> Result<(EoN, NodeHandle), BuildError> {
        let group_id = self.group_id.take().ok_or(BuildError::MissingGroupId)?;
        let node_id = self.node_id.take().ok_or(BuildError::MissingNodeId)?;
        validate_name(&group_id)?;
        validate_name(&node_id)?;
        if let Some(host_id) = &self.primary_host_id {
            validate_name(host_id)?;
        }
        if self.publish_period.is_zero() {
            return Err(BuildError::ZeroPublishPeriod);
        }
        if let Some(e) = self.registration_error.take() {
            return Err(e.into());
        }

        let mut session = Session::new(MetricTable::new(self.metrics)?);
        session.birth_payload(timestamp())?;

        let mut dispatcher = self.dispatcher;
        dispatcher.register(NODE_CONTROL_REBIRTH, rebirth_handler(self.rebirth_cooldown))?;

        let (eventloop, client) = self.eventloop_client;
        Ok(EoN::new_from_parts(NodeParts {
            config: NodeSettings {
                group_id,
                node_id,
                publish_period: self.publish_period,
                primary_host_id: self.primary_host_id,
            },
            session,
            eventloop,
            client,
            source: self.source,
            scheduler: self.scheduler,
            dispatcher,
            observer: self.observer,
        }))
    }
}
