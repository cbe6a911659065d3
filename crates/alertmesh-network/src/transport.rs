//! Transport configuration for the AlertMesh network layer.
//!
//! Nodes talk over TCP secured with Noise and multiplexed with Yamux.
//! Transport construction happens inside the [`libp2p::SwarmBuilder`]
//! pipeline in [`crate::swarm::create_host`]:
//!
//! ```text
//! SwarmBuilder::with_existing_identity(keypair)
//!     .with_tokio()
//!     .with_tcp(tcp_config(), noise::Config::new, yamux::Config::default)?
//!     .with_behaviour(|key| { ... })?
//!     .build()
//! ```

use std::time::Duration;

/// Default bound on a single outbound dial.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Returns the TCP configuration used by the swarm builder.
///
/// Nagle's algorithm is disabled (`nodelay`) for lower latency on short
/// chat frames.
pub fn tcp_config() -> libp2p::tcp::Config {
    libp2p::tcp::Config::default().nodelay(true)
}
