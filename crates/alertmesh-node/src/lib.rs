//! AlertMesh node runtime.
//!
//! Joins one room on the mesh and connects it to its consumers: the
//! in-memory message log, the transcript file, stdout, and either the
//! HTTP bridge or the terminal.

pub mod config;
pub mod console;
pub mod http;
pub mod message_log;
pub mod node;
pub mod transcript;

#[cfg(test)]
mod testing;

pub use config::{CliArgs, NodeConfig};
pub use message_log::MessageLog;
pub use node::Node;
