//! AlertMesh node binary.
//!
//! Usage:
//!
//!   alertmesh [OPTIONS]
//!
//! Joins the room on the local mesh, prints received messages and either
//! reads messages to send from the terminal or, with `--enable-http`,
//! serves the HTTP bridge for a browser frontend.
//!
//! Every flag can also be set through an `ALERTMESH_*` environment
//! variable; `RUST_LOG` sets the log filter (default: info).
//!
//! The node runs until interrupted with Ctrl+C.

use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;

use alertmesh_network::identity::generate_keypair;
use alertmesh_node::config::{CliArgs, NodeConfig};
use alertmesh_node::node::{Node, Task};

/// Time given to background tasks to stop after Ctrl+C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = CliArgs::parse();

    print_banner();

    let config = match NodeConfig::resolve(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run_node(config).await {
        tracing::error!("node error: {e}");
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Node main logic
// ---------------------------------------------------------------------------

async fn run_node(cfg: NodeConfig) -> Result<(), String> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut node = Node::start(&cfg, generate_keypair(), shutdown_rx)
        .await
        .map_err(|e| format!("node start failed: {e}"))?;

    print_summary(&cfg, &node);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received Ctrl+C, shutting down...");
                break;
            }
            finished = node.next_finished() => match finished {
                Some(Task::Terminal) => {
                    tracing::info!("terminal input closed; still receiving, press Ctrl+C to stop");
                }
                Some(task) => {
                    let _ = shutdown_tx.send(true);
                    node.shutdown(SHUTDOWN_GRACE).await;
                    return Err(format!("{task} stopped unexpectedly"));
                }
                None => {
                    return Err("all node tasks stopped".into());
                }
            },
        }
    }

    let _ = shutdown_tx.send(true);
    node.shutdown(SHUTDOWN_GRACE).await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn print_summary(cfg: &NodeConfig, node: &Node) {
    println!();
    println!("============================================================");
    println!("  AlertMesh node running");
    println!("============================================================");
    println!("  Node ID:      {}", node.node_id());
    println!("  Nick:         {}", cfg.nick);
    println!("  Room:         {}", node.room());
    println!("  Rendezvous:   {}", cfg.rendezvous);
    println!("  mDNS:         {}", if cfg.enable_mdns { "enabled" } else { "disabled" });
    println!("  Transcript:   {}", cfg.transcript.display());
    for addr in node.connection_strings() {
        println!("  Connect with: {addr}");
    }
    println!("============================================================");
    match node.http_addr() {
        Some(addr) => {
            println!("  HTTP server enabled - AlertMesh backend is running...");
            println!("  Frontend should connect to http://localhost:{}", addr.port());
        }
        None => {
            println!("  Type a message and press Enter to send it");
        }
    }
    println!("  Press Ctrl+C to stop");
    println!("============================================================");
    println!();
}

fn print_banner() {
    println!(r#"
     _    _           _   __  __           _
    / \  | | ___ _ __| |_|  \/  | ___  ___| |__
   / _ \ | |/ _ \ '__| __| |\/| |/ _ \/ __| '_ \
  / ___ \| |  __/ |  | |_| |  | |  __/\__ \ | | |
 /_/   \_\_|\___|_|   \__|_|  |_|\___||___/_| |_|
                                          v{}
"#, env!("CARGO_PKG_VERSION"));
}
