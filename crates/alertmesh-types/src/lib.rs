//! Core shared types for the AlertMesh peer-to-peer alerting network.
//!
//! Identifiers, room names and the workspace-wide error type live here.
//! This crate deliberately has no libp2p dependency; conversions between
//! [`NodeId`] and libp2p's `PeerId` are provided by `alertmesh-network`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

/// Stable identity of a node in the mesh.
///
/// Holds the canonical byte encoding of the node's peer identity
/// (multihash of its public key). Ordering is plain byte-wise comparison
/// of that encoding, which is the order the connection tie-break relies
/// on. The textual form is base58btc, the same string libp2p prints for
/// a `PeerId`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(Vec<u8>);

impl NodeId {
    /// Wraps the canonical identity bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(AlertmeshError::InvalidNodeId {
                reason: "node id must not be empty".into(),
            });
        }
        Ok(Self(bytes))
    }

    /// Returns the canonical identity bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the id, returning the canonical bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for NodeId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(&self.0).into_string())
    }
}

impl FromStr for NodeId {
    type Err = AlertmeshError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(AlertmeshError::InvalidNodeId {
                reason: "empty string".into(),
            });
        }
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| AlertmeshError::InvalidNodeId {
                reason: format!("invalid base58 encoding: {e}"),
            })?;
        Self::from_bytes(bytes)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// Prefix shared by every room topic on the gossip overlay.
pub const ROOM_TOPIC_PREFIX: &str = "chat-room:";

/// A named chat room. Always non-empty.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Room(String);

impl Room {
    /// Creates a room, rejecting empty or whitespace-only names.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(AlertmeshError::ConfigError {
                reason: "room name must not be empty".into(),
            });
        }
        Ok(Self(name))
    }

    /// Returns the room name.
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Returns the pub/sub topic this room is bound to.
    pub fn topic_name(&self) -> String {
        format!("{ROOM_TOPIC_PREFIX}{}", self.0)
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Room {
    type Err = AlertmeshError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for Room {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// AlertmeshError
// ---------------------------------------------------------------------------

/// Central error type for AlertMesh.
///
/// Every crate in the workspace reports failures through this enum.
/// Setup failures (`IdentityCreation`, `SubscriptionError`, `ConfigError`)
/// are fatal to the process; the rest are local to a single interaction.
#[derive(Debug, Error)]
pub enum AlertmeshError {
    /// The local keypair or swarm could not be created.
    #[error("identity creation failed: {reason}")]
    IdentityCreation {
        /// Human-readable description of the failure.
        reason: String,
    },

    /// A node id string or byte sequence is malformed.
    #[error("invalid node id: {reason}")]
    InvalidNodeId {
        /// Human-readable description of why the id is invalid.
        reason: String,
    },

    /// An outbound connection attempt failed or timed out.
    #[error("dial failed: {reason}")]
    DialError {
        /// Human-readable description of the dial failure.
        reason: String,
    },

    /// The pub/sub engine refused a topic subscription.
    #[error("subscription failed: {reason}")]
    SubscriptionError {
        /// Human-readable description of the subscription failure.
        reason: String,
    },

    /// A message could not be handed to the pub/sub engine.
    #[error("publish failed: {reason}")]
    PublishError {
        /// Human-readable description of the publish failure.
        reason: String,
    },

    /// Inbound bytes are not a well-formed message envelope.
    #[error("decode failed: {reason}")]
    DecodeError {
        /// Human-readable description of the decode failure.
        reason: String,
    },

    /// A configuration value is invalid or missing.
    #[error("config error: {reason}")]
    ConfigError {
        /// Human-readable description of the configuration problem.
        reason: String,
    },

    /// A networking or transport operation failed.
    #[error("network error: {reason}")]
    NetworkError {
        /// Human-readable description of the network failure.
        reason: String,
    },

    /// The message log or transcript file could not be written.
    #[error("storage error: {reason}")]
    StorageError {
        /// Human-readable description of the storage failure.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Result alias
// ---------------------------------------------------------------------------

/// Convenience result type using [`AlertmeshError`].
pub type Result<T> = std::result::Result<T, AlertmeshError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
