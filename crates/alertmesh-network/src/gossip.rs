//! Gossipsub construction and topic helpers.
//!
//! Every room maps to one gossipsub topic. Messages are signed by the
//! publishing node's identity and payloads above the configured
//! transmit size are refused by the engine.

use std::time::Duration;

use libp2p::gossipsub;
use libp2p::identity;

use alertmesh_types::{AlertmeshError, Result};

/// Builds a configured `gossipsub::Behaviour`.
///
/// # Parameters
///
/// - `keypair`: identity used for message signing
///   (`MessageAuthenticity::Signed`).
/// - `max_transmit_size`: largest payload relayed or published.
/// - `heartbeat`: mesh maintenance interval.
///
/// # Errors
///
/// Returns `AlertmeshError::NetworkError` if the gossipsub config is
/// rejected.
pub fn build_gossip_behaviour(
    keypair: &identity::Keypair,
    max_transmit_size: usize,
    heartbeat: Duration,
) -> Result<gossipsub::Behaviour> {
    let config = gossipsub::ConfigBuilder::default()
        .max_transmit_size(max_transmit_size)
        .heartbeat_interval(heartbeat)
        .build()
        .map_err(|e| AlertmeshError::NetworkError {
            reason: format!("failed to build gossipsub config: {e}"),
        })?;

    gossipsub::Behaviour::new(
        gossipsub::MessageAuthenticity::Signed(keypair.clone()),
        config,
    )
    .map_err(|e| AlertmeshError::NetworkError {
        reason: format!("failed to create gossipsub behaviour: {e}"),
    })
}

/// Creates a gossipsub [`gossipsub::IdentTopic`] from a topic string.
pub fn topic(name: &str) -> gossipsub::IdentTopic {
    gossipsub::IdentTopic::new(name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
