//! AlertMesh libp2p network layer.
//!
//! Provides node identity, transport configuration, local discovery,
//! connection arbitration and room-scoped pub/sub for the AlertMesh
//! peer-to-peer alerting network.
//!
//! # Architecture
//!
//! - [`identity`]: Ed25519 node identity and `NodeId` ↔ `PeerId`
//! - [`transport`]: TCP + Noise + Yamux settings
//! - [`gossip`]: gossipsub construction and topics
//! - [`discovery`]: mDNS discoveries as a bounded, typed feed
//! - [`arbiter`]: tie-break and dial scheduling
//! - [`room`]: room channels over the pub/sub engine
//! - [`swarm`]: swarm driver task and its cloneable handle
//! - [`config`]: network configuration with defaults

pub mod arbiter;
pub mod config;
pub mod discovery;
pub mod gossip;
pub mod identity;
pub mod room;
pub mod swarm;
pub mod transport;

pub use arbiter::{arbitrate, ConnectionArbiter, Decision, Dialer};
pub use config::NetworkConfig;
pub use discovery::{discovery_channel, DiscoveryEvent, DiscoveryFeed, DiscoveryOrigin, PeerAddress};
pub use room::{Broadcast, GossipMessage, RoomChannel, RoomMessages, RoomPublisher};
pub use swarm::{create_host, SwarmDriver, SwarmHandle};
