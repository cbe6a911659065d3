//! Limits enforced on outbound messages before they reach the gossip
//! layer.

use alertmesh_types::{AlertmeshError, Result};

/// Largest encoded envelope accepted for publishing (64 KiB).
///
/// The gossip transmit limit defaults to the same value.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Rejects an empty or whitespace-only message body.
pub fn validate_body(body: &str) -> Result<()> {
    if body.trim().is_empty() {
        return Err(AlertmeshError::PublishError {
            reason: "message body must not be empty".into(),
        });
    }
    Ok(())
}

/// Rejects an encoded payload larger than `limit` bytes.
pub fn validate_size(payload: &[u8], limit: usize) -> Result<()> {
    if payload.len() > limit {
        return Err(AlertmeshError::PublishError {
            reason: format!(
                "payload too large: {} bytes exceeds limit of {limit}",
                payload.len()
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_rejected() {
        assert!(validate_body("").is_err());
        assert!(validate_body(" \n\t").is_err());
        assert!(validate_body("fire on floor 3").is_ok());
    }

    #[test]
    fn size_at_limit_accepted() {
        let payload = vec![0u8; MAX_MESSAGE_SIZE];
        assert!(validate_size(&payload, MAX_MESSAGE_SIZE).is_ok());
    }

    #[test]
    fn size_over_limit_rejected() {
        let payload = vec![0u8; MAX_MESSAGE_SIZE + 1];
        assert!(matches!(
            validate_size(&payload, MAX_MESSAGE_SIZE),
            Err(AlertmeshError::PublishError { .. })
        ));
    }
}
