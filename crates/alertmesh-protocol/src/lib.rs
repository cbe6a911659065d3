//! Chat message protocol for AlertMesh.
//!
//! Defines the message envelope exchanged on a room topic, its JSON wire
//! encoding, and the size and content limits enforced before a message
//! is handed to the gossip layer.
//!
//! # Modules
//!
//! - [`message`]: `MessageEnvelope`, `ReceivedMessage`, log-line formatting
//! - [`codec`]: JSON encode/decode of envelopes
//! - [`validation`]: payload size cap and body checks

pub mod codec;
pub mod message;
pub mod validation;

pub use codec::{decode, encode};
pub use message::{MessageEnvelope, ReceivedMessage};
