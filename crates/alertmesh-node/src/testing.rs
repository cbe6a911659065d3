//! Test doubles shared by the node's unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use alertmesh_network::{Broadcast, GossipMessage, RoomChannel, RoomMessages, RoomPublisher};
use alertmesh_protocol::{codec, MessageEnvelope};
use alertmesh_types::{AlertmeshError, NodeId, Result, Room};

/// In-memory pub/sub engine. Every publish reaches every subscriber of
/// the topic; the next `failures` publishes are refused.
#[derive(Default)]
pub(crate) struct TestBroadcast {
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<GossipMessage>>>>,
    failures: AtomicUsize,
    published: Mutex<Vec<Vec<u8>>>,
}

impl TestBroadcast {
    pub(crate) fn failing(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            ..Self::default()
        }
    }

    /// Bodies of every accepted publish, in order.
    pub(crate) fn published_bodies(&self) -> Vec<String> {
        let published = match self.published.lock() {
            Ok(p) => p.clone(),
            Err(_) => return Vec::new(),
        };
        published
            .iter()
            .filter_map(|bytes| codec::decode(bytes).ok())
            .map(|envelope| envelope.body)
            .collect()
    }

    /// Delivers an envelope from another node to the room's subscribers.
    pub(crate) fn deliver(&self, room: &Room, envelope: &MessageEnvelope) {
        let data = match codec::encode(envelope) {
            Ok(data) => data,
            Err(e) => panic!("encode: {e}"),
        };
        if let Ok(subs) = self.subscribers.lock() {
            for tx in subs.get(&room.topic_name()).into_iter().flatten() {
                let _ = tx.send(GossipMessage {
                    source: Some(envelope.sender_id.clone()),
                    data: data.clone(),
                });
            }
        }
    }
}

impl Broadcast for TestBroadcast {
    fn subscribe(&self, topic: String) -> BoxFuture<'_, Result<mpsc::UnboundedReceiver<GossipMessage>>> {
        Box::pin(async move {
            let (tx, rx) = mpsc::unbounded_channel();
            self.subscribers
                .lock()
                .map_err(|e| AlertmeshError::SubscriptionError {
                    reason: e.to_string(),
                })?
                .entry(topic)
                .or_default()
                .push(tx);
            Ok(rx)
        })
    }

    fn publish(&self, _topic: String, data: Vec<u8>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let refused = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(AlertmeshError::PublishError {
                    reason: "no peers subscribed to topic".into(),
                });
            }
            if let Ok(mut published) = self.published.lock() {
                published.push(data);
            }
            Ok(())
        })
    }
}

pub(crate) fn node_id(byte: u8) -> NodeId {
    match NodeId::from_bytes(vec![byte; 4]) {
        Ok(id) => id,
        Err(e) => panic!("test id: {e}"),
    }
}

pub(crate) fn room() -> Room {
    match Room::new("chat-room") {
        Ok(room) => room,
        Err(e) => panic!("test room: {e}"),
    }
}

/// Joins the test room on `engine` as node 1 ("tester").
pub(crate) async fn join(engine: Arc<TestBroadcast>) -> (RoomPublisher, RoomMessages) {
    match RoomChannel::join(engine, room(), node_id(1), "tester").await {
        Ok(channel) => channel.split(),
        Err(e) => panic!("join: {e}"),
    }
}
