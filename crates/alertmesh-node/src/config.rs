//! CLI argument parsing and config file support.
//!
//! The node can be configured via CLI flags (each also read from an
//! `ALERTMESH_*` environment variable), a JSON config file, or both.
//! Explicit flags override the file.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use clap::Parser;
use libp2p::Multiaddr;
use serde::{Deserialize, Serialize};

use alertmesh_network::config::DEFAULT_RENDEZVOUS;
use alertmesh_network::transport::DEFAULT_DIAL_TIMEOUT;
use alertmesh_network::{NetworkConfig, PeerAddress};
use alertmesh_types::{AlertmeshError, Result, Room};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_NICK: &str = "User";
pub const DEFAULT_ROOM: &str = "chat-room";
pub const DEFAULT_HTTP_PORT: u16 = 3001;
pub const DEFAULT_TRANSCRIPT: &str = "logs.txt";

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// AlertMesh peer-to-peer alerting node.
#[derive(Parser, Debug, Default)]
#[command(name = "alertmesh", version, about)]
pub struct CliArgs {
    /// P2P listen port (0 picks a free port)
    #[arg(short, long, env = "ALERTMESH_PORT")]
    pub port: Option<u16>,

    /// P2P listen host
    #[arg(long, env = "ALERTMESH_HOST")]
    pub host: Option<String>,

    /// Nickname shown to other peers
    #[arg(short, long, env = "ALERTMESH_NICK")]
    pub nick: Option<String>,

    /// Room to join
    #[arg(short, long, env = "ALERTMESH_ROOM")]
    pub room: Option<String>,

    /// Serve the HTTP bridge instead of reading the terminal
    #[arg(long, env = "ALERTMESH_ENABLE_HTTP")]
    pub enable_http: bool,

    /// HTTP bridge port
    #[arg(long, env = "ALERTMESH_HTTP_PORT")]
    pub http_port: Option<u16>,

    /// Rendezvous tag; only peers with the same tag stay connected
    #[arg(
        long,
        visible_alias = "same-string",
        alias = "same_string",
        env = "ALERTMESH_RENDEZVOUS"
    )]
    pub rendezvous: Option<String>,

    /// Peer to dial at startup, e.g. /ip4/1.2.3.4/tcp/4001/p2p/12D3KooW...
    #[arg(long, env = "ALERTMESH_PEER_ADDRESS")]
    pub peer_address: Option<String>,

    /// File that received messages are appended to
    #[arg(long, env = "ALERTMESH_TRANSCRIPT")]
    pub transcript: Option<PathBuf>,

    /// Disable mDNS local discovery
    #[arg(long, env = "ALERTMESH_NO_MDNS")]
    pub no_mdns: bool,

    /// Dial timeout in seconds
    #[arg(long, env = "ALERTMESH_DIAL_TIMEOUT")]
    pub dial_timeout: Option<u64>,

    /// Load settings from a JSON config file
    #[arg(long, env = "ALERTMESH_CONFIG")]
    pub config: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Config file (JSON)
// ---------------------------------------------------------------------------

/// JSON config file format. Every field is optional.
///
/// Example `alertmesh.json`:
/// ```json
/// {
///   "port": 4001,
///   "nick": "ops-desk",
///   "room": "alerts",
///   "enable_http": true,
///   "rendezvous": "site-a",
///   "enable_mdns": false,
///   "peer_address": "/ip4/10.0.0.5/tcp/4001/p2p/12D3KooW..."
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct NodeConfigFile {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub nick: Option<String>,
    pub room: Option<String>,
    pub enable_http: Option<bool>,
    pub http_port: Option<u16>,
    pub rendezvous: Option<String>,
    pub peer_address: Option<String>,
    pub transcript: Option<PathBuf>,
    pub enable_mdns: Option<bool>,
    pub dial_timeout_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved config (all defaults applied)
// ---------------------------------------------------------------------------

/// Fully resolved node configuration with all defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    pub nick: String,
    pub room: String,
    pub enable_http: bool,
    pub http_port: u16,
    pub rendezvous: String,
    pub peer_address: Option<String>,
    pub transcript: PathBuf,
    pub enable_mdns: bool,
    pub dial_timeout_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::from_file(NodeConfigFile::default())
    }
}

impl NodeConfig {
    /// Build config purely from CLI args with defaults.
    pub fn from_cli(cli: &CliArgs) -> Self {
        Self::default().merge_cli(cli)
    }

    /// Load config from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| AlertmeshError::ConfigError {
            reason: format!("failed to read config file '{}': {e}", path.display()),
        })?;
        Self::from_json(&text)
    }

    /// Parse config from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let file: NodeConfigFile =
            serde_json::from_str(text).map_err(|e| AlertmeshError::ConfigError {
                reason: format!("invalid config JSON: {e}"),
            })?;
        Ok(Self::from_file(file))
    }

    fn from_file(file: NodeConfigFile) -> Self {
        Self {
            host: file.host.unwrap_or_else(|| DEFAULT_HOST.into()),
            port: file.port.unwrap_or(0),
            nick: file.nick.unwrap_or_else(|| DEFAULT_NICK.into()),
            room: file.room.unwrap_or_else(|| DEFAULT_ROOM.into()),
            enable_http: file.enable_http.unwrap_or(false),
            http_port: file.http_port.unwrap_or(DEFAULT_HTTP_PORT),
            rendezvous: file.rendezvous.unwrap_or_else(|| DEFAULT_RENDEZVOUS.into()),
            peer_address: file.peer_address,
            transcript: file
                .transcript
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TRANSCRIPT)),
            enable_mdns: file.enable_mdns.unwrap_or(true),
            dial_timeout_secs: file
                .dial_timeout_secs
                .unwrap_or(DEFAULT_DIAL_TIMEOUT.as_secs()),
        }
    }

    /// Merge CLI overrides onto a config-file base.
    pub fn merge_cli(mut self, cli: &CliArgs) -> Self {
        if let Some(ref host) = cli.host {
            self.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(ref nick) = cli.nick {
            self.nick = nick.clone();
        }
        if let Some(ref room) = cli.room {
            self.room = room.clone();
        }
        if cli.enable_http {
            self.enable_http = true;
        }
        if let Some(port) = cli.http_port {
            self.http_port = port;
        }
        if let Some(ref tag) = cli.rendezvous {
            self.rendezvous = tag.clone();
        }
        if cli.peer_address.is_some() {
            self.peer_address = cli.peer_address.clone();
        }
        if let Some(ref path) = cli.transcript {
            self.transcript = path.clone();
        }
        if cli.no_mdns {
            self.enable_mdns = false;
        }
        if let Some(secs) = cli.dial_timeout {
            self.dial_timeout_secs = secs;
        }
        self
    }

    /// Resolves CLI args, loading the config file first when one is named.
    pub fn resolve(cli: &CliArgs) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => Self::load(path)?.merge_cli(cli),
            None => Self::from_cli(cli),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks every field before anything is started.
    ///
    /// # Errors
    ///
    /// Returns [`AlertmeshError::ConfigError`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.nick.trim().is_empty() {
            return Err(AlertmeshError::ConfigError {
                reason: "nick must not be empty".into(),
            });
        }
        self.room()?;
        self.peer()?;
        self.network_config()?.validate()
    }

    pub fn room(&self) -> Result<Room> {
        Room::new(self.room.clone())
    }

    /// The operator-supplied peer, if any.
    pub fn peer(&self) -> Result<Option<PeerAddress>> {
        self.peer_address.as_deref().map(str::parse).transpose()
    }

    fn host_ip(&self) -> Result<IpAddr> {
        self.host.parse().map_err(|e| AlertmeshError::ConfigError {
            reason: format!("invalid host '{}': {e}", self.host),
        })
    }

    /// The P2P listen multiaddr, `/ip4/<host>/tcp/<port>`.
    pub fn listen_addr(&self) -> Result<Multiaddr> {
        let ip = self.host_ip()?;
        Ok(Multiaddr::from(ip).with(libp2p::multiaddr::Protocol::Tcp(self.port)))
    }

    /// Address the HTTP bridge binds to.
    pub fn http_addr(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::new(self.host_ip()?, self.http_port))
    }

    pub fn network_config(&self) -> Result<NetworkConfig> {
        Ok(NetworkConfig {
            listen_addr: self.listen_addr()?,
            dial_timeout_secs: self.dial_timeout_secs,
            enable_mdns: self.enable_mdns,
            rendezvous: self.rendezvous.clone(),
            ..NetworkConfig::default()
        })
    }
}
