//! Node lifecycle.
//!
//! [`Node::start`] wires the subsystems together and spawns one task
//! per unit of work:
//!
//! ```text
//! swarm driver ──▶ discovery feed ──▶ connection arbiter ──▶ dials
//!      │
//!      └──▶ room inbound ──▶ message log, stdout, transcript
//!
//! HTTP bridge / terminal ──▶ room publisher ──▶ swarm driver
//! ```
//!
//! Every task holds the same shutdown receiver. Flipping the sender to
//! `true` stops them all; [`Node::shutdown`] then waits for them.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use libp2p::identity::Keypair;
use libp2p::Multiaddr;
use tokio::sync::watch;
use tokio::task::JoinSet;

use alertmesh_network::discovery::{DiscoveryEvent, DiscoveryOrigin};
use alertmesh_network::{create_host, ConnectionArbiter, RoomChannel, RoomMessages, RoomPublisher, SwarmHandle};
use alertmesh_types::{AlertmeshError, NodeId, Result, Room};

use crate::config::NodeConfig;
use crate::console;
use crate::http::{self, HttpState};
use crate::message_log::MessageLog;
use crate::transcript::Transcript;

/// How long to wait for the swarm to report a listen address.
const LISTEN_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Background units spawned by a node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Task {
    Swarm,
    Arbiter,
    Inbound,
    Http,
    Terminal,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Task::Swarm => "swarm driver",
            Task::Arbiter => "connection arbiter",
            Task::Inbound => "room inbound",
            Task::Http => "HTTP bridge",
            Task::Terminal => "terminal input",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A running AlertMesh node.
pub struct Node {
    handle: SwarmHandle,
    room: Room,
    publisher: RoomPublisher,
    log: MessageLog,
    listen_addrs: Vec<Multiaddr>,
    http_addr: Option<SocketAddr>,
    tasks: JoinSet<Task>,
}

impl Node {
    /// Starts every subsystem.
    ///
    /// # Errors
    ///
    /// Any error here is a setup failure:
    /// - `ConfigError` for invalid settings.
    /// - `StorageError` if the transcript cannot be opened.
    /// - `IdentityCreation` / `NetworkError` if the swarm cannot start.
    /// - `SubscriptionError` if the room cannot be joined.
    pub async fn start(
        config: &NodeConfig,
        keypair: Keypair,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        config.validate()?;
        let network = config.network_config()?;
        let room = config.room()?;
        let peer = config.peer()?;

        let transcript = Transcript::open(&config.transcript).await?;

        let (handle, driver, feed) = create_host(&network, keypair)?;
        let local = handle.local_node_id().clone();
        let mut tasks = JoinSet::new();

        let driver_shutdown = shutdown.clone();
        tasks.spawn(async move {
            driver.run(driver_shutdown).await;
            Task::Swarm
        });

        let first_addr = tokio::time::timeout(LISTEN_TIMEOUT, handle.wait_for_listen_addr())
            .await
            .map_err(|_| AlertmeshError::NetworkError {
                reason: format!(
                    "no listen address after {}s on {}",
                    LISTEN_TIMEOUT.as_secs(),
                    network.listen_addr
                ),
            })??;
        tracing::info!(%first_addr, node_id = %local, "node listening");

        let arbiter = ConnectionArbiter::new(
            local.clone(),
            Arc::new(handle.clone()),
            network.dial_timeout(),
        );
        let arbiter_shutdown = shutdown.clone();
        tasks.spawn(async move {
            arbiter.run(feed, arbiter_shutdown).await;
            Task::Arbiter
        });

        let channel =
            RoomChannel::join(Arc::new(handle.clone()), room.clone(), local, config.nick.clone())
                .await?;
        let (publisher, messages) = channel.split();
        let log = MessageLog::new();

        if let Some(peer) = peer {
            tracing::info!(node_id = %peer.node_id, "dialing operator-supplied peer");
            let mut sink_shutdown = shutdown.clone();
            let event = DiscoveryEvent {
                peer,
                origin: DiscoveryOrigin::Operator,
            };
            if !handle.discovery_sink().send(event, &mut sink_shutdown).await {
                tracing::warn!("shutdown before operator peer could be queued");
            }
        }

        let inbound_log = log.clone();
        let inbound_shutdown = shutdown.clone();
        tasks.spawn(async move {
            relay_inbound(messages, inbound_log, transcript, inbound_shutdown).await;
            Task::Inbound
        });

        let http_addr = if config.enable_http {
            let listener = http::bind(config.http_addr()?).await?;
            let bound = listener.local_addr().map_err(|e| AlertmeshError::NetworkError {
                reason: format!("HTTP listener has no local address: {e}"),
            })?;
            let state = Arc::new(HttpState {
                log: log.clone(),
                publisher: publisher.clone(),
            });
            let http_shutdown = shutdown.clone();
            tasks.spawn(async move {
                if let Err(e) = http::serve(listener, state, http_shutdown).await {
                    tracing::error!(%e, "HTTP bridge stopped with error");
                }
                Task::Http
            });
            Some(bound)
        } else {
            let terminal_publisher = publisher.clone();
            let terminal_log = log.clone();
            let terminal_shutdown = shutdown;
            tasks.spawn(async move {
                console::run(terminal_publisher, terminal_log, terminal_shutdown).await;
                Task::Terminal
            });
            None
        };

        Ok(Self {
            listen_addrs: handle.listeners(),
            handle,
            room,
            publisher,
            log,
            http_addr,
            tasks,
        })
    }

    pub fn node_id(&self) -> &NodeId {
        self.handle.local_node_id()
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    pub fn handle(&self) -> &SwarmHandle {
        &self.handle
    }

    /// Publish path shared with the HTTP bridge and terminal.
    pub fn publisher(&self) -> &RoomPublisher {
        &self.publisher
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// Bound address of the HTTP bridge, when enabled.
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    /// `<listen addr>/p2p/<node id>` for every address known at startup.
    pub fn connection_strings(&self) -> Vec<Multiaddr> {
        self.listen_addrs
            .iter()
            .map(|addr| self.handle.connection_string(addr))
            .collect()
    }

    /// Waits for the next background task to finish.
    ///
    /// Returns `None` once every task has finished.
    pub async fn next_finished(&mut self) -> Option<Task> {
        loop {
            match self.tasks.join_next().await? {
                Ok(task) => return Some(task),
                Err(e) if e.is_cancelled() => continue,
                Err(e) => {
                    tracing::error!(%e, "node task panicked");
                    continue;
                }
            }
        }
    }

    /// Waits up to `grace` for every task to stop after shutdown has
    /// been signalled, then aborts whatever is left.
    pub async fn shutdown(mut self, grace: Duration) {
        let drained = tokio::time::timeout(grace, async {
            while let Some(task) = self.next_finished().await {
                tracing::debug!(%task, "task stopped");
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!(remaining = self.tasks.len(), "aborting tasks after grace period");
            self.tasks.abort_all();
        }
        tracing::info!("node stopped");
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Formats each received message once and hands it to the log, stdout
/// and the transcript.
async fn relay_inbound(
    mut messages: RoomMessages,
    log: MessageLog,
    mut transcript: Transcript,
    mut shutdown: watch::Receiver<bool>,
) {
    if *shutdown.borrow() {
        return;
    }

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            received = messages.next() => match received {
                Some(message) => {
                    let line = message.log_line();
                    if let Err(e) = log.append(line.clone()) {
                        tracing::warn!(%e, "failed to record received message");
                    }
                    println!("{line}");
                    transcript.record(&line).await;
                }
                None => {
                    tracing::warn!("room subscription ended");
                    break;
                }
            },
        }
    }
}
