//! Message types for the AlertMesh room protocol.
//!
//! A [`MessageEnvelope`] is what travels on the wire. A
//! [`ReceivedMessage`] is an envelope plus the local time it arrived,
//! which is what consumers (HTTP bridge, transcript, terminal) see.

use alertmesh_types::NodeId;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Timestamp layout used in message log lines.
///
/// Nanosecond precision with a numeric UTC offset, e.g.
/// `2025-05-24 18:56:46.496570947 +0530`.
pub const LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f %z";

// ---------------------------------------------------------------------------
// MessageEnvelope
// ---------------------------------------------------------------------------

/// A chat message as published on a room topic.
///
/// Field names on the wire are `Message`, `SenderID`, `SenderNick` and
/// the optional `Room`. `sender_id` is always stamped by the publishing
/// node, never taken from user input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Node id of the publisher.
    #[serde(rename = "SenderID")]
    pub sender_id: NodeId,
    /// Display nickname chosen by the publisher.
    #[serde(rename = "SenderNick")]
    pub sender_nick: String,
    /// Message text.
    #[serde(rename = "Message")]
    pub body: String,
    /// Room the message was published to. Absent on envelopes from
    /// nodes that predate room tagging.
    #[serde(rename = "Room", default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

impl MessageEnvelope {
    /// Returns `true` if the envelope may be delivered to `room`.
    ///
    /// Untagged envelopes are accepted by every room.
    pub fn belongs_to(&self, room: &str) -> bool {
        self.room.as_deref().map_or(true, |r| r == room)
    }
}

// ---------------------------------------------------------------------------
// ReceivedMessage
// ---------------------------------------------------------------------------

/// An envelope delivered from a remote node, stamped on arrival.
#[derive(Clone, Debug, PartialEq)]
pub struct ReceivedMessage {
    pub envelope: MessageEnvelope,
    pub received_at: DateTime<Local>,
}

impl ReceivedMessage {
    /// Stamps `envelope` with the current local time.
    pub fn now(envelope: MessageEnvelope) -> Self {
        Self {
            envelope,
            received_at: Local::now(),
        }
    }

    /// Renders the message as a log line (without trailing newline).
    pub fn log_line(&self) -> String {
        log_line(&self.received_at, &self.envelope.sender_nick, &self.envelope.body)
    }
}

/// Formats `Received message at <time> from <from>: <body>`.
///
/// Locally sent messages use `"You"` as `from`.
pub fn log_line(at: &DateTime<Local>, from: &str, body: &str) -> String {
    format!(
        "Received message at {} from {}: {}",
        at.format(LOG_TIME_FORMAT),
        from,
        body
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sender() -> alertmesh_types::Result<NodeId> {
        NodeId::from_bytes(vec![0x00, 0x24, 0x08, 0x01])
    }

    #[test]
    fn untagged_envelope_belongs_to_any_room() -> alertmesh_types::Result<()> {
        let env = MessageEnvelope {
            sender_id: sender()?,
            sender_nick: "alice".into(),
            body: "hello".into(),
            room: None,
        };
        assert!(env.belongs_to("lobby"));
        assert!(env.belongs_to("ops"));
        Ok(())
    }

    #[test]
    fn tagged_envelope_belongs_to_its_room_only() -> alertmesh_types::Result<()> {
        let env = MessageEnvelope {
            sender_id: sender()?,
            sender_nick: "alice".into(),
            body: "hello".into(),
            room: Some("ops".into()),
        };
        assert!(env.belongs_to("ops"));
        assert!(!env.belongs_to("lobby"));
        Ok(())
    }

    #[test]
    fn log_line_layout() {
        let at = Local
            .with_ymd_and_hms(2025, 5, 24, 18, 56, 46)
            .single()
            .unwrap_or_else(Local::now);
        let line = log_line(&at, "alice", "hello there");
        assert!(line.starts_with("Received message at 2025-05-24 18:56:46.000000000 "));
        assert!(line.ends_with(" from alice: hello there"));
    }
}
