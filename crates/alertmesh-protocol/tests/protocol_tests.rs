//! Integration tests for alertmesh-protocol.
//!
//! Exercises the public API the way a remote node sees it: bytes in,
//! envelope out, plus compatibility with payloads produced by older
//! chat nodes.

use alertmesh_protocol::message::log_line;
use alertmesh_protocol::validation::{validate_size, MAX_MESSAGE_SIZE};
use alertmesh_protocol::{decode, encode, MessageEnvelope, ReceivedMessage};
use alertmesh_types::{AlertmeshError, NodeId};
use chrono::{Local, TimeZone};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn alice_id() -> NodeId {
    NodeId::from_bytes(vec![0x00, 0x24, 0x08, 0x01, 0x12, 0x20, 0xaa]).expect("valid id")
}

fn envelope(body: &str) -> MessageEnvelope {
    MessageEnvelope {
        sender_id: alice_id(),
        sender_nick: "alice".into(),
        body: body.into(),
        room: Some("chat-room".into()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn hello_from_alice_decodes_remotely() {
    let bytes = encode(&envelope("hello")).expect("encode");
    let remote = decode(&bytes).expect("decode");
    assert_eq!(remote.sender_nick, "alice");
    assert_eq!(remote.body, "hello");
    assert_eq!(remote.sender_id, alice_id());
}

#[test]
fn legacy_payload_without_room_is_accepted() {
    let id = bs58::encode(alice_id().as_bytes()).into_string();
    let legacy = format!(r#"{{"Message":"ping","SenderID":"{id}","SenderNick":"ops"}}"#);
    let decoded = decode(legacy.as_bytes()).expect("decode legacy");
    assert_eq!(decoded.room, None);
    assert!(decoded.belongs_to("any-room"));
}

#[test]
fn truncated_payload_is_decode_error() {
    let bytes = encode(&envelope("hello")).expect("encode");
    let truncated = &bytes[..bytes.len() / 2];
    assert!(matches!(decode(truncated), Err(AlertmeshError::DecodeError { .. })));
}

#[test]
fn largest_body_under_cap_fits() {
    let overhead = encode(&envelope("")).expect("encode").len();
    let body = "x".repeat(MAX_MESSAGE_SIZE - overhead);
    let bytes = encode(&envelope(&body)).expect("encode");
    assert!(validate_size(&bytes, MAX_MESSAGE_SIZE).is_ok());

    let over = encode(&envelope(&format!("{body}x"))).expect("encode");
    assert!(validate_size(&over, MAX_MESSAGE_SIZE).is_err());
}

#[test]
fn received_line_matches_sent_line_format() {
    let at = Local.with_ymd_and_hms(2025, 5, 24, 18, 56, 46).single().expect("valid time");
    let received = ReceivedMessage {
        envelope: envelope("hello"),
        received_at: at,
    };
    let sent = log_line(&at, "You", "hello");
    assert_eq!(
        received.log_line().replace(" from alice: ", " from You: "),
        sent
    );
}
