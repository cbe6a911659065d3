//! Room channels.
//!
//! A [`RoomChannel`] binds a [`Room`] to its pub/sub topic. Publishing
//! stamps the local node id, nickname and room onto a
//! [`MessageEnvelope`]; the inbound side yields [`ReceivedMessage`]s
//! from other nodes.
//!
//! # Ordering
//!
//! There is no ordering across senders. Messages from a single sender
//! arrive in publish order only as far as the underlying links preserve
//! it.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::Stream;
use tokio::sync::mpsc;

use alertmesh_protocol::validation::{validate_body, validate_size, MAX_MESSAGE_SIZE};
use alertmesh_protocol::{codec, MessageEnvelope, ReceivedMessage};
use alertmesh_types::{NodeId, Result, Room};

// ---------------------------------------------------------------------------
// Broadcast
// ---------------------------------------------------------------------------

/// Raw message delivered by the pub/sub engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GossipMessage {
    /// Original publisher, when the engine knows it.
    pub source: Option<NodeId>,
    pub data: Vec<u8>,
}

/// Topic pub/sub engine as seen by a room.
///
/// Implemented by [`crate::swarm::SwarmHandle`]; tests supply an
/// in-memory loopback.
pub trait Broadcast: Send + Sync {
    /// Subscribes to `topic`, returning the inbound message receiver.
    ///
    /// Fails with `SubscriptionError` if the engine refuses.
    fn subscribe(&self, topic: String) -> BoxFuture<'_, Result<mpsc::UnboundedReceiver<GossipMessage>>>;

    /// Publishes `data` on `topic`.
    ///
    /// Fails with `PublishError` if the engine cannot accept it.
    fn publish(&self, topic: String, data: Vec<u8>) -> BoxFuture<'_, Result<()>>;
}

// ---------------------------------------------------------------------------
// RoomChannel
// ---------------------------------------------------------------------------

/// A joined room: the publish path plus the single inbound sequence.
pub struct RoomChannel {
    publisher: RoomPublisher,
    messages: RoomMessages,
}

impl RoomChannel {
    /// Subscribes to the room's topic.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionError` if the engine cannot subscribe.
    pub async fn join(
        broadcast: Arc<dyn Broadcast>,
        room: Room,
        local: NodeId,
        nick: impl Into<String>,
    ) -> Result<Self> {
        let topic = room.topic_name();
        let rx = broadcast.subscribe(topic.clone()).await?;
        tracing::info!(%room, %topic, "joined room");

        Ok(Self {
            publisher: RoomPublisher {
                broadcast,
                topic,
                room: room.clone(),
                local: local.clone(),
                nick: nick.into(),
            },
            messages: RoomMessages { rx, room, local },
        })
    }

    /// Publishes `body` to the room.
    pub async fn publish(&self, body: &str) -> Result<()> {
        self.publisher.publish(body).await
    }

    /// Returns the next message from another node.
    pub async fn next(&mut self) -> Option<ReceivedMessage> {
        self.messages.next().await
    }

    /// Returns the room this channel is bound to.
    pub fn room(&self) -> &Room {
        &self.messages.room
    }

    /// Splits into a cloneable publisher and the inbound sequence.
    pub fn split(self) -> (RoomPublisher, RoomMessages) {
        (self.publisher, self.messages)
    }
}

// ---------------------------------------------------------------------------
// RoomPublisher
// ---------------------------------------------------------------------------

/// Publish half of a [`RoomChannel`]. Cheap to clone.
#[derive(Clone)]
pub struct RoomPublisher {
    broadcast: Arc<dyn Broadcast>,
    topic: String,
    room: Room,
    local: NodeId,
    nick: String,
}

impl RoomPublisher {
    /// Stamps, encodes and broadcasts `body`.
    ///
    /// # Errors
    ///
    /// Returns `PublishError` for an empty body, an encoded envelope over
    /// the size cap, or a refusal by the engine (for example when no
    /// peer is subscribed yet).
    pub async fn publish(&self, body: &str) -> Result<()> {
        validate_body(body)?;
        let envelope = MessageEnvelope {
            sender_id: self.local.clone(),
            sender_nick: self.nick.clone(),
            body: body.to_owned(),
            room: Some(self.room.name().to_owned()),
        };
        let bytes = codec::encode(&envelope)?;
        validate_size(&bytes, MAX_MESSAGE_SIZE)?;
        self.broadcast.publish(self.topic.clone(), bytes).await?;
        tracing::debug!(room = %self.room, "message published");
        Ok(())
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn local(&self) -> &NodeId {
        &self.local
    }
}

// ---------------------------------------------------------------------------
// RoomMessages
// ---------------------------------------------------------------------------

/// Inbound half of a [`RoomChannel`].
///
/// Skips the node's own envelopes, envelopes tagged for another room
/// and undecodable payloads. Ends when the engine drops the
/// subscription; it cannot be restarted.
pub struct RoomMessages {
    rx: mpsc::UnboundedReceiver<GossipMessage>,
    room: Room,
    local: NodeId,
}

impl RoomMessages {
    /// Returns the next deliverable message, or `None` once the
    /// subscription has ended.
    pub async fn next(&mut self) -> Option<ReceivedMessage> {
        loop {
            let raw = self.rx.recv().await?;
            match self.accept(&raw) {
                Some(envelope) => return Some(ReceivedMessage::now(envelope)),
                None => continue,
            }
        }
    }

    fn accept(&self, raw: &GossipMessage) -> Option<MessageEnvelope> {
        let envelope = match codec::decode(&raw.data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(source = ?raw.source, %e, "dropping malformed message");
                return None;
            }
        };
        if envelope.sender_id == self.local {
            tracing::trace!("dropping own message");
            return None;
        }
        if !envelope.belongs_to(self.room.name()) {
            tracing::debug!(
                room = ?envelope.room,
                expected = %self.room,
                "dropping message for another room"
            );
            return None;
        }
        Some(envelope)
    }

    /// Converts into a [`Stream`] of received messages.
    pub fn into_stream(self) -> impl Stream<Item = ReceivedMessage> {
        futures::stream::unfold(self, |mut messages| async move {
            messages.next().await.map(|m| (m, messages))
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
