use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use log::{debug, error, info, warn};
use spbnode_client::{DynClient, DynEventLoop, Event, LastWill, NodeMessage, StatePayload};
use spbnode_types::{
    topic::{NodeMessage as NodeMessageType, NodeTopic, QoS, StateTopic, Topic, TopicFilter},
    utils::timestamp,
};
use tokio::{
    select,
    sync::{mpsc, oneshot},
    time::{timeout, Instant},
};

use crate::{
    dispatcher::CommandDispatcher,
    error::{PublishError, StateError},
    observer::DynNodeObserver,
    publisher::{DynValueSource, Publisher, Sample},
    scheduler::{DynScheduler, PeriodicTask, TickFuture},
    session::{NodeState, Session, Transition},
};

pub(crate) struct NodeSettings {
    pub group_id: String,
    pub node_id: String,
    pub publish_period: Duration,
    pub primary_host_id: Option<String>,
}

struct Topics {
    birth: NodeTopic,
    death: NodeTopic,
}

impl Topics {
    fn new(group_id: &str, node_id: &str) -> Self {
        Self {
            birth: NodeTopic::new(group_id, NodeMessageType::NBirth, node_id),
            death: NodeTopic::new(group_id, NodeMessageType::NDeath, node_id),
        }
    }
}

fn notify(observer: &DynNodeObserver, transition: Transition) {
    if transition.is_change() {
        observer.on_state_change(transition.from, transition.to);
    }
}

#[derive(Debug)]
struct EoNShutdown;

/// A handle for interacting with the Edge Node.
///
/// Command handlers receive a reference to the node's handle so they can
/// request a rebirth, publish or shut the node down.
#[derive(Clone)]
pub struct NodeHandle {
    session: Arc<Mutex<Session>>,
    client: Arc<DynClient>,
    publisher: Arc<Publisher>,
    observer: Arc<DynNodeObserver>,
    death_topic: NodeTopic,
    node_id: Arc<str>,
    stop_tx: mpsc::Sender<EoNShutdown>,
    rebirth_tx: mpsc::Sender<()>,
}

impl NodeHandle {
    /// Stop all operations, sending a death certificate and disconnect from the broker.
    ///
    /// This will cancel [EoN::run()]. The node cannot be restarted.
    pub async fn cancel(&self) {
        let (transition, death) = {
            let mut session = self.session.lock().unwrap();
            if session.state() == NodeState::Shutdown {
                return;
            }
            let was_active = session.state().is_active();
            let transition = session.shutdown();
            let death = match was_active {
                true => session.death_payload().ok(),
                false => None,
            };
            (transition, death)
        };
        notify(self.observer.as_ref(), transition);
        info!("Edge node stopping. Node = {}", self.node_id);

        if let Some(death) = death {
            if self
                .client
                .try_publish_node_message(self.death_topic.clone(), death)
                .await
                .is_err()
            {
                debug!("Unable to publish node death certificate on exit");
            }
        }
        _ = self.stop_tx.send(EoNShutdown).await;
        _ = self.client.disconnect().await;
        self.publisher.close_source();
    }

    /// Republish the retained birth certificate.
    ///
    /// Fails if the node is not online.
    pub fn rebirth(&self) -> Result<(), StateError> {
        if !self.state().is_active() {
            return Err(StateError::Offline);
        }
        //if the channel (size 1) is full then a rebirth will be executed anyways
        _ = self.rebirth_tx.try_send(());
        Ok(())
    }

    pub fn state(&self) -> NodeState {
        self.session.lock().unwrap().state()
    }

    /// Publish samples immediately in an NDATA, regardless of their report policy
    pub async fn publish(&self, samples: Vec<Sample>) -> Result<(), PublishError> {
        self.publisher.publish_samples(samples).await
    }
}

enum ClientStateMessage {
    Stopped,
    Online,
    Offline(oneshot::Sender<LastWill>),
    ConnectFailed,
    Violation(String),
}

enum InboundMessage {
    Command(Vec<u8>),
    State { host_id: String, payload: StatePayload },
}

struct Node {
    config: NodeSettings,
    topics: Topics,
    session: Arc<Mutex<Session>>,
    client: Arc<DynClient>,
    publisher: Arc<Publisher>,
    scheduler: Arc<DynScheduler>,
    dispatcher: CommandDispatcher<NodeHandle>,
    observer: Arc<DynNodeObserver>,
    handle: NodeHandle,
    primary_host_online: Option<bool>,

    client_state_rx: mpsc::Receiver<ClientStateMessage>,
    inbound_rx: mpsc::UnboundedReceiver<InboundMessage>,
    rebirth_rx: mpsc::Receiver<()>,
}

impl Node {
    fn sub_topics(&self) -> Vec<TopicFilter> {
        let mut topics = vec![TopicFilter::new_with_qos(
            Topic::NodeTopic(NodeTopic::new(
                &self.config.group_id,
                NodeMessageType::NCmd,
                &self.config.node_id,
            )),
            QoS::AtLeastOnce,
        )];
        if let Some(host_id) = &self.config.primary_host_id {
            topics.push(TopicFilter::new_with_qos(
                Topic::State(StateTopic::new_host(host_id)),
                QoS::AtLeastOnce,
            ));
        }
        topics
    }

    fn start_publisher(&self, epoch: u64) {
        let mut session = self.session.lock().unwrap();
        if !session.is_current(epoch) || session.has_publish_task() {
            return;
        }
        let publisher = self.publisher.clone();
        let task: PeriodicTask = Box::new(move || -> TickFuture {
            let publisher = publisher.clone();
            Box::pin(async move {
                publisher.tick(epoch).await;
            })
        });
        let handle = self.scheduler.schedule(self.config.publish_period, task);
        session.set_publish_task(epoch, handle);
    }

    async fn publish_birth(&self, birth: Vec<u8>) -> Result<(), ()> {
        match self
            .client
            .publish_node_message(self.topics.birth.clone(), birth)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                error!(
                    "Publishing node birth message failed. node={} error={e}",
                    self.config.node_id
                );
                Err(())
            }
        }
    }

    /// Publish a birth certificate, then start publishing data for `epoch`.
    ///
    /// A failed birth ends the session and asks the transport for a new connection.
    async fn announce_birth(&self, epoch: u64, birth: Vec<u8>) {
        if self.publish_birth(birth).await.is_ok() {
            let published = self.session.lock().unwrap().birth_published(epoch);
            if published {
                self.start_publisher(epoch);
            }
            return;
        }
        let transition = self.session.lock().unwrap().birth_failed(epoch);
        if let Ok(transition) = transition {
            notify(self.observer.as_ref(), transition);
            warn!(
                "Node birth failed, reconnecting. node={}",
                self.config.node_id
            );
            if let Err(e) = self.client.reconnect().await {
                error!("Unable to drop connection after failed birth: {e}");
            }
        }
    }

    async fn on_online(&mut self) {
        info!("Edge node online. Node = {}", self.config.node_id);
        let reconnect = {
            let mut session = self.session.lock().unwrap();
            match session.state() {
                NodeState::Reconnecting => session.begin_connect().ok(),
                _ => None,
            }
        };
        if let Some(transition) = reconnect {
            notify(self.observer.as_ref(), transition);
        }

        if let Err(e) = self.client.subscribe_many(self.sub_topics()).await {
            error!("Subscribing to node topics failed: {e}");
            return;
        }

        let birthed = {
            let mut session = self.session.lock().unwrap();
            session
                .go_online(timestamp())
                .map(|(transition, birth)| (transition, birth, session.epoch()))
        };
        let (epoch, birth) = match birthed {
            Ok((transition, birth, epoch)) => {
                notify(self.observer.as_ref(), transition);
                (epoch, birth)
            }
            Err(e) => {
                warn!("Unable to birth node: {e}");
                return;
            }
        };

        info!("Birthing Node. node={}", self.config.node_id);
        self.announce_birth(epoch, birth).await;
    }

    fn on_offline(&mut self, will_sender: oneshot::Sender<LastWill>) {
        let (transition, death) = {
            let mut session = self.session.lock().unwrap();
            if session.state() == NodeState::Shutdown {
                return;
            }
            // a session ended by a failed birth is already Reconnecting
            let transition = session.disconnected().ok();
            (transition, session.death_payload())
        };
        if let Some(transition) = transition {
            notify(self.observer.as_ref(), transition);
            info!("Edge node offline. Node = {}", self.config.node_id);
        }

        match death {
            Ok(death) => {
                _ = will_sender.send(LastWill::new_node(
                    &self.config.group_id,
                    &self.config.node_id,
                    death,
                ))
            }
            Err(e) => error!("Unable to encode death certificate: {e}"),
        }
    }

    fn on_connect_failed(&self) {
        let transition = self.session.lock().unwrap().connect_failed();
        if let Ok(transition) = transition {
            notify(self.observer.as_ref(), transition);
        }
    }

    fn on_violation(&self, reason: &str) {
        let transition = self.session.lock().unwrap().protocol_violation();
        match transition {
            Ok(transition) => {
                warn!("Protocol violation: {reason}");
                notify(self.observer.as_ref(), transition);
            }
            Err(_) => debug!("Ignoring protocol violation while offline: {reason}"),
        }
    }

    async fn rebirth(&mut self) {
        let rebirth = {
            let mut session = self.session.lock().unwrap();
            session
                .rebirth()
                .map(|(transition, birth)| (transition, birth, session.epoch()))
        };
        let (transition, birth, epoch) = match rebirth {
            Ok(rebirth) => rebirth,
            Err(e) => {
                debug!("Ignoring rebirth request: {e}");
                return;
            }
        };
        notify(self.observer.as_ref(), transition);
        info!("Rebirthing Node. node={}", self.config.node_id);
        self.announce_birth(epoch, birth).await;
    }

    fn on_command(&self, payload: Vec<u8>) {
        if !self.session.lock().unwrap().state().is_active() {
            debug!("Ignoring command received while not online");
            return;
        }
        match self.dispatcher.dispatch(&payload, &self.handle) {
            Ok(report) => {
                debug!("Command dispatched: {report:?}");
                let transition = self.session.lock().unwrap().valid_message();
                if let Ok(transition) = transition {
                    notify(self.observer.as_ref(), transition);
                }
            }
            Err(e) => self.on_violation(&e.to_string()),
        }
    }

    async fn on_state(&mut self, host_id: String, payload: StatePayload) {
        if self.config.primary_host_id.as_deref() != Some(host_id.as_str()) {
            return;
        }
        let online = payload.is_online();
        let previous = self.primary_host_online.replace(online);
        info!("Primary host {host_id} online = {online}");
        if previous == Some(false) && online {
            self.rebirth().await;
        }
    }

    async fn run(mut self) {
        loop {
            select! {
                biased;
                maybe_state_update = self.client_state_rx.recv() => match maybe_state_update {
                    Some(state_update) => match state_update {
                        ClientStateMessage::Online => self.on_online().await,
                        ClientStateMessage::Offline(sender) => self.on_offline(sender),
                        ClientStateMessage::ConnectFailed => self.on_connect_failed(),
                        ClientStateMessage::Violation(reason) => self.on_violation(&reason),
                        ClientStateMessage::Stopped => break,
                    },
                    None => break, //EoN has been dropped
                },
                Some(_) = self.rebirth_rx.recv() => self.rebirth().await,
                maybe_message = self.inbound_rx.recv() => match maybe_message {
                    Some(InboundMessage::Command(payload)) => self.on_command(payload),
                    Some(InboundMessage::State { host_id, payload }) => {
                        self.on_state(host_id, payload).await
                    }
                    None => break, //EoN has been dropped
                },
            }
        }
    }
}

/// Parts the builder hands over to assemble a node
pub(crate) struct NodeParts {
    pub config: NodeSettings,
    pub session: Session,
    pub eventloop: Box<DynEventLoop>,
    pub client: Arc<DynClient>,
    pub source: Box<DynValueSource>,
    pub scheduler: Arc<DynScheduler>,
    pub dispatcher: CommandDispatcher<NodeHandle>,
    pub observer: Arc<DynNodeObserver>,
}

/// Structure that represents a Sparkplug Edge Node instance.
///
/// See [EoNBuilder](crate::EoNBuilder) on how to create an [EoN] instance.
pub struct EoN {
    group_id: String,
    node_id: String,
    eventloop: Box<DynEventLoop>,
    session: Arc<Mutex<Session>>,
    observer: Arc<DynNodeObserver>,
    node: Option<Node>,
    stop_rx: mpsc::Receiver<EoNShutdown>,
    inbound_tx: mpsc::UnboundedSender<InboundMessage>,
    client_state_tx: mpsc::Sender<ClientStateMessage>,
}

impl EoN {
    pub(crate) fn new_from_parts(parts: NodeParts) -> (Self, NodeHandle) {
        let NodeParts {
            config,
            session,
            eventloop,
            client,
            source,
            scheduler,
            dispatcher,
            observer,
        } = parts;

        let session = Arc::new(Mutex::new(session));
        let topics = Topics::new(&config.group_id, &config.node_id);
        let publisher = Arc::new(Publisher::new(
            session.clone(),
            source,
            client.clone(),
            NodeTopic::new(&config.group_id, NodeMessageType::NData, &config.node_id),
            observer.clone(),
        ));

        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (rebirth_tx, rebirth_rx) = mpsc::channel(1);
        let (client_state_tx, client_state_rx) = mpsc::channel(1);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let handle = NodeHandle {
            session: session.clone(),
            client: client.clone(),
            publisher: publisher.clone(),
            observer: observer.clone(),
            death_topic: topics.death.clone(),
            node_id: Arc::from(config.node_id.as_str()),
            stop_tx,
            rebirth_tx,
        };

        let dispatcher = dispatcher
            .with_aliases(session.lock().unwrap().aliases().clone())
            .with_observer(observer.clone());

        let group_id = config.group_id.clone();
        let node_id = config.node_id.clone();
        let node = Node {
            config,
            topics,
            session: session.clone(),
            client,
            publisher,
            scheduler,
            dispatcher,
            observer: observer.clone(),
            handle: handle.clone(),
            primary_host_online: None,
            client_state_rx,
            inbound_rx,
            rebirth_rx,
        };

        let eon = Self {
            group_id,
            node_id,
            eventloop,
            session,
            observer,
            node: Some(node),
            stop_rx,
            inbound_tx,
            client_state_tx,
        };
        (eon, handle)
    }

    fn create_last_will(&self) -> Option<LastWill> {
        let death = self.session.lock().unwrap().death_payload();
        match death {
            Ok(death) => Some(LastWill::new_node(&self.group_id, &self.node_id, death)),
            Err(e) => {
                error!("Unable to encode death certificate: {e}");
                None
            }
        }
    }

    async fn on_offline(&mut self) {
        let (lastwill_tx, lastwill_rx) = oneshot::channel();
        _ = self
            .client_state_tx
            .send(ClientStateMessage::Offline(lastwill_tx))
            .await;
        if let Ok(will) = lastwill_rx.await {
            self.eventloop.set_last_will(will)
        }
    }

    async fn on_node_message(&mut self, message: NodeMessage) {
        if message.kind != NodeMessageType::NCmd
            || message.group_id != self.group_id
            || message.node_id != self.node_id
        {
            let reason = format!(
                "unexpected {} message for {}/{}",
                message.kind.as_str(),
                message.group_id,
                message.node_id
            );
            _ = self
                .client_state_tx
                .send(ClientStateMessage::Violation(reason))
                .await;
            return;
        }
        _ = self
            .inbound_tx
            .send(InboundMessage::Command(message.payload));
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Online => {
                _ = self.client_state_tx.send(ClientStateMessage::Online).await;
            }
            Event::Offline => self.on_offline().await,
            Event::ConnectFailed { reason } => {
                warn!("Connection attempt failed: {reason}");
                _ = self
                    .client_state_tx
                    .send(ClientStateMessage::ConnectFailed)
                    .await;
            }
            Event::Node(message) => self.on_node_message(message).await,
            Event::State { host_id, payload } => {
                _ = self
                    .inbound_tx
                    .send(InboundMessage::State { host_id, payload });
            }
            Event::InvalidPublish {
                reason,
                topic,
                payload: _,
            } => {
                let reason = format!(
                    "invalid publish on {}: {reason}",
                    String::from_utf8_lossy(&topic)
                );
                _ = self
                    .client_state_tx
                    .send(ClientStateMessage::Violation(reason))
                    .await;
            }
        }
    }

    async fn poll_until_offline(&mut self) {
        while let Some(event) = self.eventloop.poll().await {
            if event == Event::Offline {
                break;
            }
        }
    }

    /// Run the Edge Node
    ///
    /// Runs the Edge Node until [NodeHandle::cancel()] is called or the transport is closed.
    pub async fn run(mut self) {
        let Some(node) = self.node.take() else {
            return;
        };
        let transition = self.session.lock().unwrap().begin_connect();
        match transition {
            Ok(transition) => notify(self.observer.as_ref(), transition),
            Err(e) => {
                warn!("Edge node cannot run: {e}");
                return;
            }
        }
        info!("Edge node running. Node = {}", self.node_id);
        let node_task = tokio::spawn(node.run());

        if let Some(will) = self.create_last_will() {
            self.eventloop.set_last_will(will);
        }

        loop {
            select! {
                event = self.eventloop.poll() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
                Some(_) = self.stop_rx.recv() => {
                    if timeout(Duration::from_secs(1), self.poll_until_offline())
                        .await
                        .is_err()
                    {
                        debug!("Transport did not report offline after stopping");
                    }
                    break;
                }
            }
        }

        _ = self.client_state_tx.send(ClientStateMessage::Stopped).await;
        _ = node_task.await;
        info!("Edge node stopped. Node = {}", self.node_id);
    }
}

/// Handler for the node's `Node Control/Rebirth` command.
///
/// Requests arriving within `cooldown` of the last accepted one are ignored.
pub(crate) fn rebirth_handler(
    cooldown: Duration,
) -> impl Fn(&NodeHandle, Option<bool>) + Send + Sync + 'static {
    let last_request: Mutex<Option<Instant>> = Mutex::new(None);
    move |node: &NodeHandle, value: Option<bool>| {
        if value != Some(true) {
            warn!("Received invalid CMD Rebirth metric - ignoring request");
            return;
        }
        let now = Instant::now();
        let mut last = last_request.lock().unwrap();
        if let Some(last) = *last {
            if now.duration_since(last) < cooldown {
                info!("Got Rebirth CMD but cooldown time not expired. Ignoring");
                return;
            }
        }
        info!("Got Rebirth CMD - Rebirthing Node");
        match node.rebirth() {
            Ok(()) => *last = Some(now),
            Err(e) => warn!("Unable to rebirth: {e}"),
        }
    }
}
