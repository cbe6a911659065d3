//! Network configuration for the AlertMesh libp2p layer.
//!
//! All values have documented defaults. Validation ensures no
//! zero-valued timeouts, buffers or limits at startup.
//!
//! This config lives in `alertmesh-network` rather than
//! `alertmesh-types` to keep `libp2p::Multiaddr` out of the shared
//! types crate.

use std::time::Duration;

use libp2p::multiaddr::Protocol;
use libp2p::Multiaddr;
use serde::{Deserialize, Serialize};

use alertmesh_protocol::validation::MAX_MESSAGE_SIZE;
use alertmesh_types::{AlertmeshError, Result};

/// Rendezvous tag used when none is configured.
pub const DEFAULT_RENDEZVOUS: &str = "alertmesh";

/// Network-layer configuration.
///
/// Controls the listening address, local discovery, the rendezvous
/// tag that isolates meshes from each other, and the timeouts and
/// limits of the swarm.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    // -----------------------------------------------------------------------
    // Core networking
    // -----------------------------------------------------------------------

    /// Multiaddr on which this node listens for incoming connections.
    ///
    /// Default: `/ip4/0.0.0.0/tcp/0` (OS-assigned port on all interfaces).
    #[serde(with = "multiaddr_serde")]
    pub listen_addr: Multiaddr,

    /// Seconds before an outbound dial attempt is aborted.
    pub dial_timeout_secs: u64,

    /// Seconds before an idle connection is closed by the swarm.
    pub idle_timeout_secs: u64,

    // -----------------------------------------------------------------------
    // Local discovery
    // -----------------------------------------------------------------------

    /// Enable mDNS for automatic peer discovery on the local network.
    ///
    /// Default: `true`.
    pub enable_mdns: bool,

    /// Seconds an mDNS record stays valid.
    pub mdns_ttl_secs: u64,

    /// Seconds between mDNS queries.
    pub mdns_query_interval_secs: u64,

    /// Tag shared by every node of one mesh.
    ///
    /// Advertised as the identify protocol version
    /// `/alertmesh/<tag>/1.0.0`. Connected peers advertising a different
    /// tag are disconnected. Must not contain `/` or whitespace.
    pub rendezvous: String,

    /// Capacity of the discovery feed. When full, discovery waits.
    pub discovery_buffer: usize,

    // -----------------------------------------------------------------------
    // Gossip
    // -----------------------------------------------------------------------

    /// Largest payload accepted for publishing or relaying, in bytes.
    pub max_message_size: usize,

    /// Milliseconds between gossipsub heartbeats.
    pub heartbeat_interval_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let mut listen_addr = Multiaddr::empty();
        listen_addr.push(Protocol::Ip4(std::net::Ipv4Addr::UNSPECIFIED));
        listen_addr.push(Protocol::Tcp(0));

        Self {
            listen_addr,
            dial_timeout_secs: 10,
            idle_timeout_secs: 60,
            enable_mdns: true,
            mdns_ttl_secs: 300,
            mdns_query_interval_secs: 30,
            rendezvous: DEFAULT_RENDEZVOUS.into(),
            discovery_buffer: 32,
            max_message_size: MAX_MESSAGE_SIZE,
            heartbeat_interval_ms: 1_000,
        }
    }
}

impl NetworkConfig {
    /// Returns the identify protocol version derived from the rendezvous
    /// tag.
    pub fn protocol_version(&self) -> String {
        format!("/alertmesh/{}/1.0.0", self.rendezvous)
    }

    /// Dial timeout as a [`Duration`].
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }

    /// Validates all configuration values.
    ///
    /// Returns `Err(AlertmeshError::ConfigError)` if any value is
    /// outside its acceptable range.
    pub fn validate(&self) -> Result<()> {
        if self.dial_timeout_secs == 0 {
            return Err(AlertmeshError::ConfigError {
                reason: "dial_timeout_secs must be greater than 0".into(),
            });
        }
        if self.idle_timeout_secs == 0 {
            return Err(AlertmeshError::ConfigError {
                reason: "idle_timeout_secs must be greater than 0".into(),
            });
        }
        if self.enable_mdns && self.mdns_ttl_secs == 0 {
            return Err(AlertmeshError::ConfigError {
                reason: "mdns_ttl_secs must be greater than 0".into(),
            });
        }
        if self.enable_mdns && self.mdns_query_interval_secs == 0 {
            return Err(AlertmeshError::ConfigError {
                reason: "mdns_query_interval_secs must be greater than 0".into(),
            });
        }
        if self.rendezvous.is_empty() {
            return Err(AlertmeshError::ConfigError {
                reason: "rendezvous must not be empty".into(),
            });
        }
        if self
            .rendezvous
            .chars()
            .any(|c| c == '/' || c.is_whitespace())
        {
            return Err(AlertmeshError::ConfigError {
                reason: "rendezvous must not contain '/' or whitespace".into(),
            });
        }
        if self.discovery_buffer == 0 {
            return Err(AlertmeshError::ConfigError {
                reason: "discovery_buffer must be greater than 0".into(),
            });
        }
        if self.max_message_size == 0 {
            return Err(AlertmeshError::ConfigError {
                reason: "max_message_size must be greater than 0".into(),
            });
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(AlertmeshError::ConfigError {
                reason: "heartbeat_interval_ms must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Serde helpers: Multiaddr does not implement Serialize/Deserialize
// ---------------------------------------------------------------------------

mod multiaddr_serde {
    use libp2p::Multiaddr;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(addr: &Multiaddr, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Multiaddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
