//! Discovery feed for the AlertMesh network.
//!
//! Turns mDNS found-peer notifications (and operator-supplied peer
//! addresses) into a single typed, bounded stream of
//! [`DiscoveryEvent`]s consumed by the connection arbiter.
//!
//! # Backpressure
//!
//! The feed is a bounded `mpsc` channel. When it is full the
//! [`DiscoverySink`] waits for space; it never drops an event and never
//! buffers without bound. The wait is abandoned only when shutdown is
//! signalled.

use std::fmt;
use std::str::FromStr;

use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId};
use tokio::sync::{mpsc, watch};

use alertmesh_types::{AlertmeshError, NodeId, Result};

use crate::identity::{node_id_from_peer_id, peer_id_from_node_id};

// ---------------------------------------------------------------------------
// PeerAddress
// ---------------------------------------------------------------------------

/// A remote node and the addresses it can be reached on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerAddress {
    pub node_id: NodeId,
    pub addrs: Vec<Multiaddr>,
}

impl PeerAddress {
    /// Parses a fully-qualified address ending in `/p2p/<peer_id>`.
    ///
    /// The `/p2p` component is stripped from the stored dial address.
    ///
    /// # Errors
    ///
    /// Returns [`AlertmeshError::ConfigError`] if the address carries no
    /// trailing `/p2p/<peer_id>` component.
    pub fn from_multiaddr(addr: &Multiaddr) -> Result<Self> {
        let mut transport = addr.clone();
        let peer_id = match transport.pop() {
            Some(Protocol::P2p(peer_id)) => peer_id,
            _ => {
                return Err(AlertmeshError::ConfigError {
                    reason: format!("peer address '{addr}' must end with /p2p/<peer_id>"),
                })
            }
        };
        let addrs = if transport.is_empty() {
            Vec::new()
        } else {
            vec![transport]
        };
        Ok(Self {
            node_id: node_id_from_peer_id(&peer_id)?,
            addrs,
        })
    }

    /// Returns the libp2p identity of the peer.
    pub fn peer_id(&self) -> Result<PeerId> {
        peer_id_from_node_id(&self.node_id)
    }
}

impl FromStr for PeerAddress {
    type Err = AlertmeshError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let addr: Multiaddr = s.parse().map_err(|e| AlertmeshError::ConfigError {
            reason: format!("invalid multiaddr '{s}': {e}"),
        })?;
        Self::from_multiaddr(&addr)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {} address(es)", self.node_id, self.addrs.len())
    }
}

// ---------------------------------------------------------------------------
// DiscoveryEvent
// ---------------------------------------------------------------------------

/// Where a discovered peer came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscoveryOrigin {
    /// Local-network multicast discovery.
    Mdns,
    /// Supplied by the operator on the command line.
    Operator,
}

/// One discovered peer. Duplicates are expected and tolerated downstream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveryEvent {
    pub peer: PeerAddress,
    pub origin: DiscoveryOrigin,
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// Creates the bounded discovery feed.
pub fn discovery_channel(capacity: usize) -> (DiscoverySink, DiscoveryFeed) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (DiscoverySink { tx }, DiscoveryFeed { rx })
}

/// Producer half of the discovery feed.
#[derive(Clone, Debug)]
pub struct DiscoverySink {
    tx: mpsc::Sender<DiscoveryEvent>,
}

impl DiscoverySink {
    /// Enqueues one event, waiting while the feed is full.
    ///
    /// Returns `false` if shutdown was signalled before the event could
    /// be enqueued or the feed has been dropped.
    pub async fn send(&self, event: DiscoveryEvent, shutdown: &mut watch::Receiver<bool>) -> bool {
        if *shutdown.borrow() {
            return false;
        }
        tokio::select! {
            res = self.tx.send(event) => res.is_ok(),
            _ = shutdown.changed() => false,
        }
    }

    /// Enqueues the peers of one mDNS notification.
    ///
    /// Pairs are grouped by peer and the local node is dropped. Returns
    /// the number of events enqueued.
    pub async fn announce_mdns(
        &self,
        local: &PeerId,
        discovered: impl IntoIterator<Item = (PeerId, Multiaddr)>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> usize {
        let mut sent = 0;
        for peer in group_by_peer(local, discovered) {
            tracing::debug!(node_id = %peer.node_id, addrs = ?peer.addrs, "mDNS: discovered peer");
            let event = DiscoveryEvent {
                peer,
                origin: DiscoveryOrigin::Mdns,
            };
            if !self.send(event, shutdown).await {
                break;
            }
            sent += 1;
        }
        sent
    }
}

/// Consumer half of the discovery feed.
#[derive(Debug)]
pub struct DiscoveryFeed {
    rx: mpsc::Receiver<DiscoveryEvent>,
}

impl DiscoveryFeed {
    /// Receives the next event; `None` once every sink is gone.
    pub async fn recv(&mut self) -> Option<DiscoveryEvent> {
        self.rx.recv().await
    }
}

/// Groups `(peer, addr)` pairs into one [`PeerAddress`] per peer,
/// preserving first-seen order and skipping `local`.
pub fn group_by_peer(
    local: &PeerId,
    discovered: impl IntoIterator<Item = (PeerId, Multiaddr)>,
) -> Vec<PeerAddress> {
    let mut grouped: Vec<(PeerId, Vec<Multiaddr>)> = Vec::new();
    for (peer_id, addr) in discovered {
        if &peer_id == local {
            continue;
        }
        match grouped.iter_mut().find(|(p, _)| *p == peer_id) {
            Some((_, addrs)) => {
                if !addrs.contains(&addr) {
                    addrs.push(addr);
                }
            }
            None => grouped.push((peer_id, vec![addr])),
        }
    }

    grouped
        .into_iter()
        .filter_map(|(peer_id, addrs)| match node_id_from_peer_id(&peer_id) {
            Ok(node_id) => Some(PeerAddress { node_id, addrs }),
            Err(e) => {
                tracing::warn!(%peer_id, %e, "mDNS: skipping peer with unusable id");
                None
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
