//! Client for Delve's headless JSON-RPC API.
//!
//! This crate implements the wire format, the API v2 message types, and a
//! sequential client for the subset of `RPCServer` methods the session
//! controller uses.

pub mod client;
pub mod error;
pub mod protocol;
pub mod transport;

// Re-export key types for convenience.
pub use client::RpcClient;
pub use error::RpcError;
pub use protocol::*;
