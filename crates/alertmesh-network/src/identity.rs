//! Node identity helpers.
//!
//! A node's identity is its libp2p Ed25519 keypair. The [`NodeId`] used
//! throughout the workspace is the canonical byte encoding of the
//! matching `PeerId`, so conversions in both directions are lossless.

use libp2p::identity;
use libp2p::PeerId;

use alertmesh_types::{AlertmeshError, NodeId, Result};

/// Generates a fresh random Ed25519 identity for this process.
pub fn generate_keypair() -> identity::Keypair {
    identity::Keypair::generate_ed25519()
}

/// Builds a deterministic Ed25519 identity from a 32-byte secret seed.
///
/// # Errors
///
/// Returns [`AlertmeshError::IdentityCreation`] if libp2p rejects the
/// seed bytes.
pub fn keypair_from_seed(seed: [u8; 32]) -> Result<identity::Keypair> {
    identity::Keypair::ed25519_from_bytes(seed).map_err(|e| AlertmeshError::IdentityCreation {
        reason: format!("invalid ed25519 seed: {e}"),
    })
}

/// Converts a libp2p `PeerId` into a [`NodeId`].
pub fn node_id_from_peer_id(peer_id: &PeerId) -> Result<NodeId> {
    NodeId::from_bytes(peer_id.to_bytes())
}

/// Converts a [`NodeId`] back into a libp2p `PeerId`.
///
/// # Errors
///
/// Returns [`AlertmeshError::InvalidNodeId`] if the bytes are not a
/// valid peer identity multihash.
pub fn peer_id_from_node_id(node_id: &NodeId) -> Result<PeerId> {
    PeerId::from_bytes(node_id.as_bytes()).map_err(|e| AlertmeshError::InvalidNodeId {
        reason: format!("not a peer identity: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_keypair_is_deterministic() -> Result<()> {
        let a = keypair_from_seed([0x42u8; 32])?;
        let b = keypair_from_seed([0x42u8; 32])?;
        assert_eq!(a.public().to_peer_id(), b.public().to_peer_id());
        Ok(())
    }

    #[test]
    fn different_seeds_give_different_peers() -> Result<()> {
        let a = keypair_from_seed([0x01u8; 32])?;
        let b = keypair_from_seed([0x02u8; 32])?;
        assert_ne!(a.public().to_peer_id(), b.public().to_peer_id());
        Ok(())
    }

    #[test]
    fn node_id_peer_id_roundtrip() -> Result<()> {
        let peer_id = generate_keypair().public().to_peer_id();
        let node_id = node_id_from_peer_id(&peer_id)?;
        assert_eq!(peer_id_from_node_id(&node_id)?, peer_id);
        Ok(())
    }

    #[test]
    fn node_id_text_matches_peer_id_text() -> Result<()> {
        let peer_id = generate_keypair().public().to_peer_id();
        let node_id = node_id_from_peer_id(&peer_id)?;
        assert_eq!(node_id.to_string(), peer_id.to_base58());
        Ok(())
    }

    #[test]
    fn arbitrary_bytes_are_not_a_peer() -> Result<()> {
        let node_id = NodeId::from_bytes(vec![0xFF, 0xFF, 0xFF])?;
        assert!(peer_id_from_node_id(&node_id).is_err());
        Ok(())
    }
}
