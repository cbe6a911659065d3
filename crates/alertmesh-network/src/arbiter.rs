//! Connection arbitration.
//!
//! When two nodes discover each other at the same time both would dial,
//! producing duplicate links. The arbiter breaks the symmetry with a
//! deterministic rule on node ids: the node with the larger id waits,
//! the node with the smaller id dials. Operator-supplied peers skip the
//! rule since the operator explicitly asked for the dial.
//!
//! Events are consumed one at a time in arrival order. Each dial runs in
//! its own task, bounded by a timeout, so a hanging dial never stalls
//! discovery. At most one dial per peer is in flight.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinError, JoinSet};

use alertmesh_types::{AlertmeshError, NodeId, Result};

use crate::discovery::{DiscoveryEvent, DiscoveryFeed, DiscoveryOrigin, PeerAddress};

// ---------------------------------------------------------------------------
// Tie-break
// ---------------------------------------------------------------------------

/// Outcome of the tie-break between the local node and a discovered one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// The local node dials.
    Initiate,
    /// The remote node is expected to dial.
    Defer,
}

/// Decides which side of a discovered pair dials.
///
/// A discovered id strictly greater than `local` defers; anything else
/// initiates. For distinct ids exactly one side initiates.
pub fn arbitrate(local: &NodeId, discovered: &NodeId) -> Decision {
    if discovered > local {
        Decision::Defer
    } else {
        Decision::Initiate
    }
}

// ---------------------------------------------------------------------------
// Dialer
// ---------------------------------------------------------------------------

/// Something that can open a connection to a peer.
///
/// Implemented by [`crate::swarm::SwarmHandle`]; tests supply their own.
pub trait Dialer: Send + Sync + 'static {
    /// Connects to `peer`, giving up after `timeout`.
    fn dial(&self, peer: PeerAddress, timeout: Duration) -> BoxFuture<'static, Result<()>>;
}

// ---------------------------------------------------------------------------
// ConnectionArbiter
// ---------------------------------------------------------------------------

/// What the arbiter did with one discovery event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The event named the local node.
    IgnoredSelf,
    /// The tie-break said the remote side dials.
    Deferred,
    /// A dial to the same peer is already running.
    AlreadyDialing,
    /// A dial task was started.
    Dialing,
}

type DialResult = (NodeId, Result<()>);

/// Consumes the discovery feed and dials peers.
pub struct ConnectionArbiter<D: Dialer> {
    local: NodeId,
    dialer: Arc<D>,
    dial_timeout: Duration,
    in_flight: HashMap<NodeId, AbortHandle>,
    tasks: JoinSet<DialResult>,
}

impl<D: Dialer> ConnectionArbiter<D> {
    pub fn new(local: NodeId, dialer: Arc<D>, dial_timeout: Duration) -> Self {
        Self {
            local,
            dialer,
            dial_timeout,
            in_flight: HashMap::new(),
            tasks: JoinSet::new(),
        }
    }

    /// Number of dials currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Handles one discovery event. Must be called from within a tokio
    /// runtime since dials are spawned as tasks.
    pub fn on_discovered(&mut self, event: DiscoveryEvent) -> Outcome {
        let node_id = event.peer.node_id.clone();

        if node_id == self.local {
            tracing::debug!("discovered self, ignoring");
            return Outcome::IgnoredSelf;
        }

        if event.origin == DiscoveryOrigin::Mdns
            && arbitrate(&self.local, &node_id) == Decision::Defer
        {
            tracing::debug!(%node_id, "deferring connection to peer with larger id");
            return Outcome::Deferred;
        }

        if self.in_flight.contains_key(&node_id) {
            tracing::debug!(%node_id, "dial already in flight");
            return Outcome::AlreadyDialing;
        }

        tracing::info!(%node_id, origin = ?event.origin, "dialing discovered peer");

        let timeout = self.dial_timeout;
        let dial = self.dialer.dial(event.peer, timeout);
        let id = node_id.clone();
        let handle = self.tasks.spawn(async move {
            let result = match tokio::time::timeout(timeout, dial).await {
                Ok(result) => result,
                Err(_) => Err(AlertmeshError::DialError {
                    reason: format!("timed out after {}s", timeout.as_secs()),
                }),
            };
            (id, result)
        });
        self.in_flight.insert(node_id, handle);
        Outcome::Dialing
    }

    fn on_dial_finished(&mut self, joined: std::result::Result<DialResult, JoinError>) {
        match joined {
            Ok((node_id, Ok(()))) => {
                self.in_flight.remove(&node_id);
                tracing::info!(%node_id, "connected to peer");
            }
            Ok((node_id, Err(e))) => {
                self.in_flight.remove(&node_id);
                tracing::warn!(%node_id, %e, "dial failed");
            }
            Err(e) => {
                self.in_flight.retain(|_, handle| !handle.is_finished());
                if !e.is_cancelled() {
                    tracing::warn!(%e, "dial task failed");
                }
            }
        }
    }

    /// Waits for the next running dial to finish and records it.
    ///
    /// Returns `false` if no dial was running.
    pub async fn reap_one(&mut self) -> bool {
        match self.tasks.join_next().await {
            Some(joined) => {
                self.on_dial_finished(joined);
                true
            }
            None => false,
        }
    }

    /// Aborts every running dial.
    pub fn abort_all(&mut self) {
        self.tasks.abort_all();
        self.in_flight.clear();
    }

    /// Runs until shutdown is signalled or the feed closes.
    pub async fn run(mut self, mut feed: DiscoveryFeed, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(local = %self.local, "connection arbiter started");

        if *shutdown.borrow() {
            return;
        }

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    self.on_dial_finished(joined);
                }

                event = feed.recv() => match event {
                    Some(event) => {
                        self.on_discovered(event);
                    }
                    None => {
                        tracing::debug!("discovery feed closed");
                        break;
                    }
                },
            }
        }

        let aborted = self.in_flight.len();
        self.abort_all();
        tracing::info!(aborted, "connection arbiter stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
