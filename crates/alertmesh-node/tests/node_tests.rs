//! Integration tests: full nodes on loopback.
//!
//! Starts AlertMesh nodes on 127.0.0.1 with mDNS disabled and the HTTP
//! bridge on an ephemeral port, links them with `--peer-address`, and
//! checks delivery into the message log, the transcript and the bridge.
//!
//! Requires: `tokio` multi-thread runtime.

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;

use alertmesh_network::identity::generate_keypair;
use alertmesh_node::{Node, NodeConfig};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(20);

fn node_config(dir: &Path, nick: &str, peer_address: Option<String>) -> NodeConfig {
    NodeConfig {
        host: "127.0.0.1".into(),
        port: 0,
        nick: nick.into(),
        enable_http: true,
        http_port: 0,
        rendezvous: "node-tests".into(),
        peer_address,
        transcript: dir.join(format!("{nick}.txt")),
        enable_mdns: false,
        ..NodeConfig::default()
    }
}

async fn http_get(node: &Node, path: &str) -> String {
    let addr = node.http_addr().expect("HTTP bridge enabled");
    let mut stream = TcpStream::connect(addr).await.expect("connect to bridge");
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.expect("write request");
    let mut response = String::new();
    stream.read_to_string(&mut response).await.expect("read response");
    response
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn message_from_alice_reaches_bob() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("alertmesh_node=debug,alertmesh_network=debug")
        .try_init();

    let dir = tempfile::tempdir().expect("tempdir");
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let alice = Node::start(
        &node_config(dir.path(), "alice", None),
        generate_keypair(),
        shutdown_rx.clone(),
    )
    .await
    .expect("alice starts");

    let alice_addr = alice
        .connection_strings()
        .into_iter()
        .next()
        .expect("alice has a connection string");

    let bob = Node::start(
        &node_config(dir.path(), "bob", Some(alice_addr.to_string())),
        generate_keypair(),
        shutdown_rx,
    )
    .await
    .expect("bob starts");

    // Publishing fails until the gossip mesh has formed; keep trying.
    let publisher = alice.publisher().clone();
    let sender = tokio::spawn(async move {
        loop {
            if publisher.publish("hello").await.is_ok() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    });

    let line = tokio::time::timeout(SETTLE_TIMEOUT, async {
        loop {
            if let Some(line) = bob.log().snapshot().expect("log").into_iter().next() {
                return line;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .expect("bob receives in time");
    sender.abort();

    assert!(line.starts_with("Received message at "));
    assert!(line.ends_with(" from alice: hello"), "line was {line}");

    let transcript = std::fs::read_to_string(dir.path().join("bob.txt")).expect("transcript");
    assert!(transcript.contains(" from alice: hello\n"));

    let response = http_get(&bob, "/messages").await;
    assert!(response.starts_with("HTTP/1.1 200"), "response was {response}");
    assert!(response.contains("from alice: hello"));

    let _ = shutdown_tx.send(true);
    tokio::time::timeout(SETTLE_TIMEOUT, async {
        alice.shutdown(Duration::from_secs(2)).await;
        bob.shutdown(Duration::from_secs(2)).await;
    })
    .await
    .expect("nodes stop");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bridge_is_empty_before_traffic() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let node = Node::start(
        &node_config(dir.path(), "solo", None),
        generate_keypair(),
        shutdown_rx,
    )
    .await
    .expect("node starts");

    let response = http_get(&node, "/messages").await;
    assert!(response.starts_with("HTTP/1.1 200"), "response was {response}");
    assert!(response.ends_with("[]"), "response was {response}");

    let _ = shutdown_tx.send(true);
    node.shutdown(Duration::from_secs(2)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unwritable_transcript_fails_startup() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let config = NodeConfig {
        transcript: dir.path().join("missing").join("logs.txt"),
        ..node_config(dir.path(), "broken", None)
    };
    let result = Node::start(&config, generate_keypair(), shutdown_rx).await;
    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_room_fails_startup() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let config = NodeConfig {
        room: "   ".into(),
        ..node_config(dir.path(), "broken", None)
    };
    let result = Node::start(&config, generate_keypair(), shutdown_rx).await;
    assert!(result.is_err());
}
