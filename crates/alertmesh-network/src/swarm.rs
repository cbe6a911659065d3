//! Swarm driver and handle for the AlertMesh network.
//!
//! [`create_host`] builds a libp2p `Swarm` with the combined
//! [`AlertmeshBehaviour`] (gossipsub, optional mDNS, identify) and
//! splits it into:
//!
//! - [`SwarmDriver`]: owns the swarm; run it as a task. It is the only
//!   code that touches the swarm directly.
//! - [`SwarmHandle`]: cloneable front end that sends commands to the
//!   driver. Implements [`Dialer`] for the arbiter and [`Broadcast`] for
//!   room channels.
//! - [`DiscoveryFeed`]: mDNS discoveries, grouped per peer.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::StreamExt;
use libp2p::core::ConnectedPoint;
use libp2p::gossipsub::{self, IdentTopic, TopicHash};
use libp2p::multiaddr::Protocol;
use libp2p::swarm::behaviour::toggle::Toggle;
use libp2p::swarm::dial_opts::{DialOpts, PeerCondition};
use libp2p::swarm::{ConnectionId, DialError, NetworkBehaviour, SwarmEvent};
use libp2p::{identify, identity, mdns, noise, yamux, Multiaddr, PeerId, Swarm};
use tokio::sync::{mpsc, oneshot, watch};

use alertmesh_protocol::validation::validate_size;
use alertmesh_types::{AlertmeshError, NodeId};

use crate::arbiter::Dialer;
use crate::config::NetworkConfig;
use crate::discovery::{discovery_channel, DiscoveryFeed, DiscoverySink, PeerAddress};
use crate::gossip;
use crate::identity::node_id_from_peer_id;
use crate::room::{Broadcast, GossipMessage};
use crate::transport;

/// Convenience alias to avoid shadowing `std::result::Result`
/// which the `#[derive(NetworkBehaviour)]` macro requires.
type BResult<T> = std::result::Result<T, AlertmeshError>;

/// Capacity of the handle → driver command channel.
const COMMAND_BUFFER: usize = 64;

/// Agent string advertised through identify.
const AGENT_VERSION: &str = concat!("alertmesh/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Combined behaviour
// ---------------------------------------------------------------------------

/// Combined libp2p behaviour for AlertMesh.
///
/// The `#[derive(NetworkBehaviour)]` macro auto-generates
/// `AlertmeshBehaviourEvent` with one variant per field.
#[derive(NetworkBehaviour)]
pub struct AlertmeshBehaviour {
    /// Room pub/sub.
    pub gossip: gossipsub::Behaviour,
    /// LAN discovery, absent when disabled in config.
    pub mdns: Toggle<mdns::tokio::Behaviour>,
    /// Exchanges protocol versions so foreign meshes can be dropped.
    pub identify: identify::Behaviour,
}

fn build_behaviour(
    key: &identity::Keypair,
    config: &NetworkConfig,
) -> BResult<AlertmeshBehaviour> {
    let gossip = gossip::build_gossip_behaviour(
        key,
        config.max_message_size,
        Duration::from_millis(config.heartbeat_interval_ms),
    )?;

    let mdns = if config.enable_mdns {
        let mut mdns_config = mdns::Config::default();
        mdns_config.ttl = Duration::from_secs(config.mdns_ttl_secs);
        mdns_config.query_interval = Duration::from_secs(config.mdns_query_interval_secs);
        mdns_config.enable_ipv6 = false;
        let behaviour = mdns::tokio::Behaviour::new(mdns_config, key.public().to_peer_id())
            .map_err(|e| AlertmeshError::NetworkError {
                reason: format!("failed to create mDNS behaviour: {e}"),
            })?;
        Some(behaviour)
    } else {
        None
    };

    let identify = identify::Behaviour::new(
        identify::Config::new(config.protocol_version(), key.public())
            .with_agent_version(AGENT_VERSION.to_string()),
    );

    Ok(AlertmeshBehaviour {
        gossip,
        mdns: Toggle::from(mdns),
        identify,
    })
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Requests from [`SwarmHandle`] to [`SwarmDriver`].
enum SwarmCommand {
    Dial {
        peer: PeerAddress,
        reply: oneshot::Sender<BResult<()>>,
    },
    Subscribe {
        topic: String,
        reply: oneshot::Sender<BResult<mpsc::UnboundedReceiver<GossipMessage>>>,
    },
    Publish {
        topic: String,
        data: Vec<u8>,
        reply: oneshot::Sender<BResult<()>>,
    },
    ConnectedPeers {
        reply: oneshot::Sender<Vec<NodeId>>,
    },
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Builds the swarm, starts listening and returns its three parts.
///
/// The driver must be spawned (see [`SwarmDriver::run`]) before the
/// handle can do anything useful.
///
/// # Errors
///
/// - `ConfigError` if `config` is invalid.
/// - `IdentityCreation` if the transport or behaviour cannot be built.
/// - `NetworkError` if the listen address cannot be bound.
pub fn create_host(
    config: &NetworkConfig,
    keypair: identity::Keypair,
) -> BResult<(SwarmHandle, SwarmDriver, DiscoveryFeed)> {
    config.validate()?;

    let local_peer_id = keypair.public().to_peer_id();
    let local_node_id = node_id_from_peer_id(&local_peer_id)?;

    let behaviour_config = config.clone();
    let mut swarm = libp2p::SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_tcp(
            transport::tcp_config(),
            noise::Config::new,
            yamux::Config::default,
        )
        .map_err(|e| AlertmeshError::IdentityCreation {
            reason: format!("failed to configure TCP transport: {e}"),
        })?
        .with_behaviour(|key| {
            build_behaviour(key, &behaviour_config)
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
        })
        .map_err(|e| AlertmeshError::IdentityCreation {
            reason: format!("failed to build network behaviour: {e}"),
        })?
        .with_swarm_config(|cfg| {
            cfg.with_idle_connection_timeout(Duration::from_secs(config.idle_timeout_secs))
        })
        .build();

    swarm
        .listen_on(config.listen_addr.clone())
        .map_err(|e| AlertmeshError::NetworkError {
            reason: format!("failed to listen on {}: {e}", config.listen_addr),
        })?;

    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (sink, feed) = discovery_channel(config.discovery_buffer);
    let (listen_tx, listen_rx) = watch::channel(Vec::new());

    let handle = SwarmHandle {
        local_peer_id,
        local_node_id,
        command_tx,
        listen_addrs: listen_rx,
        sink: sink.clone(),
    };

    let driver = SwarmDriver {
        swarm,
        command_rx,
        sink,
        listen_addrs: listen_tx,
        protocol_version: config.protocol_version(),
        max_message_size: config.max_message_size,
        subscriptions: HashMap::new(),
        pending_dials: HashMap::new(),
        foreign_peers: HashSet::new(),
    };

    tracing::info!(%local_peer_id, listen_addr = %config.listen_addr, "swarm created");

    Ok((handle, driver, feed))
}

// ---------------------------------------------------------------------------
// SwarmHandle
// ---------------------------------------------------------------------------

/// Cloneable front end to a running [`SwarmDriver`].
#[derive(Clone)]
pub struct SwarmHandle {
    local_peer_id: PeerId,
    local_node_id: NodeId,
    command_tx: mpsc::Sender<SwarmCommand>,
    listen_addrs: watch::Receiver<Vec<Multiaddr>>,
    sink: DiscoverySink,
}

impl SwarmHandle {
    /// Returns this node's id.
    pub fn local_node_id(&self) -> &NodeId {
        &self.local_node_id
    }

    /// Returns this node's libp2p identity.
    pub fn local_peer_id(&self) -> &PeerId {
        &self.local_peer_id
    }

    /// Returns `true` if `node_id` is this node.
    pub fn is_local(&self, node_id: &NodeId) -> bool {
        node_id == &self.local_node_id
    }

    /// Returns a sink for injecting discovery events, e.g. operator
    /// supplied peers.
    pub fn discovery_sink(&self) -> DiscoverySink {
        self.sink.clone()
    }

    /// Addresses the swarm is currently listening on.
    pub fn listeners(&self) -> Vec<Multiaddr> {
        self.listen_addrs.borrow().clone()
    }

    /// Waits until the swarm reports its first listen address.
    pub async fn wait_for_listen_addr(&self) -> BResult<Multiaddr> {
        let mut rx = self.listen_addrs.clone();
        let addrs = rx
            .wait_for(|addrs| !addrs.is_empty())
            .await
            .map_err(|_| driver_gone())?;
        addrs.first().cloned().ok_or_else(driver_gone)
    }

    /// Returns `<addr>/p2p/<local peer id>`, the string other nodes pass
    /// as `--peer-address`.
    pub fn connection_string(&self, addr: &Multiaddr) -> Multiaddr {
        addr.clone().with(Protocol::P2p(self.local_peer_id))
    }

    /// Connects to `peer`, giving up after `timeout`.
    ///
    /// Succeeds immediately if the peer is already connected. Fails with
    /// `DialError` if another dial to the peer is still pending.
    pub async fn connect(&self, peer: PeerAddress, timeout: Duration) -> BResult<()> {
        let node_id = peer.node_id.clone();
        let request = self.request(|reply| SwarmCommand::Dial { peer, reply });
        match tokio::time::timeout(timeout, request).await {
            Ok(result) => result?,
            Err(_) => Err(AlertmeshError::DialError {
                reason: format!("dial to {node_id} timed out after {}s", timeout.as_secs()),
            }),
        }
    }

    /// Returns the ids of all currently connected peers.
    pub async fn connected_peers(&self) -> BResult<Vec<NodeId>> {
        self.request(|reply| SwarmCommand::ConnectedPeers { reply })
            .await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SwarmCommand,
    ) -> BResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(make(reply_tx))
            .await
            .map_err(|_| driver_gone())?;
        reply_rx.await.map_err(|_| driver_gone())
    }
}

fn driver_gone() -> AlertmeshError {
    AlertmeshError::NetworkError {
        reason: "swarm driver is not running".into(),
    }
}

impl Dialer for SwarmHandle {
    fn dial(&self, peer: PeerAddress, timeout: Duration) -> BoxFuture<'static, BResult<()>> {
        let handle = self.clone();
        Box::pin(async move { handle.connect(peer, timeout).await })
    }
}

impl Broadcast for SwarmHandle {
    fn subscribe(
        &self,
        topic: String,
    ) -> BoxFuture<'_, BResult<mpsc::UnboundedReceiver<GossipMessage>>> {
        Box::pin(async move {
            match self.request(|reply| SwarmCommand::Subscribe { topic, reply }).await {
                Ok(result) => result,
                Err(e) => Err(AlertmeshError::SubscriptionError {
                    reason: e.to_string(),
                }),
            }
        })
    }

    fn publish(&self, topic: String, data: Vec<u8>) -> BoxFuture<'_, BResult<()>> {
        Box::pin(async move {
            match self
                .request(|reply| SwarmCommand::Publish { topic, data, reply })
                .await
            {
                Ok(result) => result,
                Err(e) => Err(AlertmeshError::PublishError {
                    reason: e.to_string(),
                }),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// SwarmDriver
// ---------------------------------------------------------------------------

/// Owns the libp2p swarm and serves [`SwarmHandle`] commands.
pub struct SwarmDriver {
    swarm: Swarm<AlertmeshBehaviour>,
    command_rx: mpsc::Receiver<SwarmCommand>,
    sink: DiscoverySink,
    listen_addrs: watch::Sender<Vec<Multiaddr>>,
    protocol_version: String,
    max_message_size: usize,
    /// Active room subscriptions by topic.
    subscriptions: HashMap<TopicHash, (IdentTopic, mpsc::UnboundedSender<GossipMessage>)>,
    /// Outbound dials awaiting their first connection event.
    pending_dials: HashMap<ConnectionId, oneshot::Sender<BResult<()>>>,
    /// Peers that advertised a different rendezvous tag.
    foreign_peers: HashSet<PeerId>,
}

impl SwarmDriver {
    /// Returns the local `PeerId` of this swarm.
    pub fn local_peer_id(&self) -> &PeerId {
        self.swarm.local_peer_id()
    }

    /// Runs the event loop until shutdown is signalled.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(peer_id = %self.swarm.local_peer_id(), "swarm driver started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                Some(command) = self.command_rx.recv() => {
                    self.handle_command(command);
                }

                event = self.swarm.select_next_some() => {
                    self.handle_swarm_event(event, &mut shutdown).await;
                }
            }
        }

        for (_, reply) in self.pending_dials.drain() {
            let _ = reply.send(Err(AlertmeshError::DialError {
                reason: "shutting down".into(),
            }));
        }
        tracing::info!("swarm driver stopped");
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    fn handle_command(&mut self, command: SwarmCommand) {
        match command {
            SwarmCommand::Dial { peer, reply } => self.dial(peer, reply),
            SwarmCommand::Subscribe { topic, reply } => {
                let _ = reply.send(self.subscribe(&topic));
            }
            SwarmCommand::Publish { topic, data, reply } => {
                let _ = reply.send(self.publish(&topic, data));
            }
            SwarmCommand::ConnectedPeers { reply } => {
                let peers = self
                    .swarm
                    .connected_peers()
                    .filter_map(|p| node_id_from_peer_id(p).ok())
                    .collect();
                let _ = reply.send(peers);
            }
        }
    }

    fn dial(&mut self, peer: PeerAddress, reply: oneshot::Sender<BResult<()>>) {
        let peer_id = match peer.peer_id() {
            Ok(peer_id) => peer_id,
            Err(e) => {
                let _ = reply.send(Err(AlertmeshError::DialError {
                    reason: e.to_string(),
                }));
                return;
            }
        };
        if &peer_id == self.swarm.local_peer_id() {
            let _ = reply.send(Err(AlertmeshError::DialError {
                reason: "refusing to dial self".into(),
            }));
            return;
        }

        // Without explicit addresses, fall back to what the behaviours
        // (mDNS, identify) know about the peer.
        let opts = if peer.addrs.is_empty() {
            DialOpts::peer_id(peer_id)
                .condition(PeerCondition::DisconnectedAndNotDialing)
                .build()
        } else {
            DialOpts::peer_id(peer_id)
                .addresses(peer.addrs)
                .condition(PeerCondition::DisconnectedAndNotDialing)
                .build()
        };
        let connection_id = opts.connection_id();

        match self.swarm.dial(opts) {
            Ok(()) => {
                tracing::debug!(%peer_id, ?connection_id, "dial started");
                self.pending_dials.insert(connection_id, reply);
            }
            Err(DialError::DialPeerConditionFalse(_)) if self.swarm.is_connected(&peer_id) => {
                tracing::debug!(%peer_id, "already connected");
                let _ = reply.send(Ok(()));
            }
            Err(DialError::DialPeerConditionFalse(_)) => {
                tracing::debug!(%peer_id, "dial already pending");
                let _ = reply.send(Err(AlertmeshError::DialError {
                    reason: format!("dial to {peer_id} already pending"),
                }));
            }
            Err(e) => {
                let _ = reply.send(Err(AlertmeshError::DialError {
                    reason: format!("failed to dial {peer_id}: {e}"),
                }));
            }
        }
    }

    fn subscribe(&mut self, topic_name: &str) -> BResult<mpsc::UnboundedReceiver<GossipMessage>> {
        let topic = gossip::topic(topic_name);
        let hash = topic.hash();
        if self.subscriptions.contains_key(&hash) {
            return Err(AlertmeshError::SubscriptionError {
                reason: format!("already subscribed to '{topic_name}'"),
            });
        }
        self.swarm
            .behaviour_mut()
            .gossip
            .subscribe(&topic)
            .map_err(|e| AlertmeshError::SubscriptionError {
                reason: format!("failed to subscribe to '{topic_name}': {e}"),
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriptions.insert(hash, (topic, tx));
        tracing::info!(topic = topic_name, "subscribed");
        Ok(rx)
    }

    fn publish(&mut self, topic_name: &str, data: Vec<u8>) -> BResult<()> {
        validate_size(&data, self.max_message_size)?;
        self.swarm
            .behaviour_mut()
            .gossip
            .publish(gossip::topic(topic_name), data)
            .map_err(|e| AlertmeshError::PublishError {
                reason: format!("failed to publish to '{topic_name}': {e}"),
            })?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Swarm events
    // -----------------------------------------------------------------------

    async fn handle_swarm_event(
        &mut self,
        event: SwarmEvent<AlertmeshBehaviourEvent>,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                tracing::info!(%address, "new listen address");
                self.listen_addrs.send_modify(|addrs| addrs.push(address));
            }

            SwarmEvent::ExpiredListenAddr { address, .. } => {
                tracing::debug!(%address, "listen address expired");
                self.listen_addrs
                    .send_modify(|addrs| addrs.retain(|a| a != &address));
            }

            SwarmEvent::ConnectionEstablished {
                peer_id,
                connection_id,
                endpoint,
                num_established,
                ..
            } => {
                let direction = match endpoint {
                    ConnectedPoint::Dialer { .. } => "outbound",
                    ConnectedPoint::Listener { .. } => "inbound",
                };
                tracing::info!(%peer_id, direction, num_established, "connection established");
                if let Some(reply) = self.pending_dials.remove(&connection_id) {
                    let _ = reply.send(Ok(()));
                }
            }

            SwarmEvent::ConnectionClosed {
                peer_id,
                cause,
                num_established,
                ..
            } => {
                tracing::info!(%peer_id, ?cause, num_established, "connection closed");
            }

            SwarmEvent::OutgoingConnectionError {
                connection_id,
                peer_id,
                error,
                ..
            } => {
                tracing::warn!(?peer_id, %error, "outgoing connection error");
                if let Some(reply) = self.pending_dials.remove(&connection_id) {
                    let _ = reply.send(Err(AlertmeshError::DialError {
                        reason: error.to_string(),
                    }));
                }
            }

            SwarmEvent::IncomingConnectionError {
                local_addr,
                send_back_addr,
                error,
                ..
            } => {
                tracing::debug!(%local_addr, %send_back_addr, %error, "incoming connection error");
            }

            SwarmEvent::Behaviour(AlertmeshBehaviourEvent::Gossip(event)) => {
                self.handle_gossip_event(event);
            }

            SwarmEvent::Behaviour(AlertmeshBehaviourEvent::Mdns(event)) => {
                self.handle_mdns_event(event, shutdown).await;
            }

            SwarmEvent::Behaviour(AlertmeshBehaviourEvent::Identify(event)) => {
                self.handle_identify_event(event);
            }

            other => {
                tracing::trace!(?other, "unhandled swarm event");
            }
        }
    }

    fn handle_gossip_event(&mut self, event: gossipsub::Event) {
        match event {
            gossipsub::Event::Message {
                propagation_source,
                message,
                ..
            } => {
                let Some((topic, tx)) = self.subscriptions.get(&message.topic) else {
                    tracing::trace!(topic = %message.topic, "message for unsubscribed topic");
                    return;
                };
                let delivered = tx.send(GossipMessage {
                    source: message.source.and_then(|p| node_id_from_peer_id(&p).ok()),
                    data: message.data,
                });
                if delivered.is_err() {
                    tracing::info!(topic = %topic, "room closed, unsubscribing");
                    let topic = topic.clone();
                    self.subscriptions.remove(&message.topic);
                    let _ = self.swarm.behaviour_mut().gossip.unsubscribe(&topic);
                } else {
                    tracing::trace!(%propagation_source, "gossip message delivered");
                }
            }
            gossipsub::Event::Subscribed { peer_id, topic } => {
                tracing::debug!(%peer_id, %topic, "peer subscribed to topic");
            }
            gossipsub::Event::Unsubscribed { peer_id, topic } => {
                tracing::debug!(%peer_id, %topic, "peer unsubscribed from topic");
            }
            other => {
                tracing::trace!(?other, "other gossipsub event");
            }
        }
    }

    async fn handle_mdns_event(&mut self, event: mdns::Event, shutdown: &mut watch::Receiver<bool>) {
        match event {
            mdns::Event::Discovered(peers) => {
                let local = *self.swarm.local_peer_id();
                let foreign = &self.foreign_peers;
                let peers: Vec<(PeerId, Multiaddr)> = peers
                    .into_iter()
                    .filter(|(peer_id, _)| !foreign.contains(peer_id))
                    .collect();
                self.sink.announce_mdns(&local, peers, shutdown).await;
            }
            mdns::Event::Expired(peers) => {
                for (peer_id, addr) in peers {
                    tracing::debug!(%peer_id, %addr, "mDNS: peer expired");
                    self.foreign_peers.remove(&peer_id);
                }
            }
        }
    }

    fn handle_identify_event(&mut self, event: identify::Event) {
        match event {
            identify::Event::Received { peer_id, info, .. } => {
                if info.protocol_version != self.protocol_version {
                    tracing::info!(
                        %peer_id,
                        theirs = %info.protocol_version,
                        ours = %self.protocol_version,
                        "peer belongs to another mesh, disconnecting"
                    );
                    self.foreign_peers.insert(peer_id);
                    let _ = self.swarm.disconnect_peer_id(peer_id);
                } else {
                    tracing::debug!(
                        %peer_id,
                        agent_version = %info.agent_version,
                        "identify: received peer info"
                    );
                }
            }
            identify::Event::Error { peer_id, error, .. } => {
                tracing::debug!(%peer_id, %error, "identify: error");
            }
            other => {
                tracing::trace!(?other, "other identify event");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
