//! JSON wire encoding of [`MessageEnvelope`].
//!
//! The object layout is `{"Message", "SenderID", "SenderNick", "Room"?}`.
//! Unknown fields are ignored on decode so newer nodes can add fields
//! without breaking older ones.

use alertmesh_types::{AlertmeshError, Result};

use crate::message::MessageEnvelope;

/// Serializes an envelope to its wire bytes.
///
/// # Errors
///
/// Returns [`AlertmeshError::PublishError`] if serialization fails.
pub fn encode(envelope: &MessageEnvelope) -> Result<Vec<u8>> {
    serde_json::to_vec(envelope).map_err(|e| AlertmeshError::PublishError {
        reason: format!("envelope encoding failed: {e}"),
    })
}

/// Parses wire bytes into an envelope.
///
/// # Errors
///
/// Returns [`AlertmeshError::DecodeError`] on malformed JSON, a missing
/// required field, or an unparseable `SenderID`.
pub fn decode(bytes: &[u8]) -> Result<MessageEnvelope> {
    serde_json::from_slice(bytes).map_err(|e| AlertmeshError::DecodeError {
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alertmesh_types::NodeId;

    fn alice() -> Result<MessageEnvelope> {
        Ok(MessageEnvelope {
            sender_id: NodeId::from_bytes(vec![0x00, 0x24, 0x08, 0x01, 0x12])?,
            sender_nick: "alice".into(),
            body: "hello".into(),
            room: Some("chat-room".into()),
        })
    }

    #[test]
    fn decode_inverts_encode() -> Result<()> {
        let env = alice()?;
        let bytes = encode(&env)?;
        assert_eq!(decode(&bytes)?, env);
        Ok(())
    }

    #[test]
    fn wire_field_names() -> Result<()> {
        let bytes = encode(&alice()?)?;
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("\"Message\":\"hello\""));
        assert!(text.contains("\"SenderNick\":\"alice\""));
        assert!(text.contains("\"SenderID\":"));
        assert!(text.contains("\"Room\":\"chat-room\""));
        Ok(())
    }

    #[test]
    fn absent_room_is_omitted() -> Result<()> {
        let env = MessageEnvelope {
            room: None,
            ..alice()?
        };
        let bytes = encode(&env)?;
        assert!(!String::from_utf8_lossy(&bytes).contains("Room"));
        assert_eq!(decode(&bytes)?.room, None);
        Ok(())
    }

    #[test]
    fn unknown_fields_ignored() -> Result<()> {
        let id = alice()?.sender_id.to_string();
        let json = format!(
            r#"{{"Message":"hi","SenderID":"{id}","SenderNick":"bob","Priority":3}}"#
        );
        let env = decode(json.as_bytes())?;
        assert_eq!(env.body, "hi");
        assert_eq!(env.sender_nick, "bob");
        Ok(())
    }

    #[test]
    fn missing_field_is_decode_error() {
        let result = decode(br#"{"Message":"hi","SenderNick":"bob"}"#);
        assert!(matches!(result, Err(AlertmeshError::DecodeError { .. })));
    }

    #[test]
    fn malformed_bytes_is_decode_error() {
        let result = decode(b"\xff\x00not json");
        assert!(matches!(result, Err(AlertmeshError::DecodeError { .. })));
    }

    #[test]
    fn bad_sender_id_is_decode_error() {
        let result = decode(br#"{"Message":"hi","SenderID":"0OIl","SenderNick":"bob"}"#);
        assert!(matches!(result, Err(AlertmeshError::DecodeError { .. })));
    }
}
