//! RPC error types.

use thiserror::Error;

/// Errors from talking to a Delve API server.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Could not open the TCP connection to the server.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Address that was dialled.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// Socket-level failure after the connection was established.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server closed the connection before replying.
    #[error("connection closed while waiting for {method}")]
    Closed {
        /// The method that was in flight.
        method: String,
    },

    /// The server answered with an error string.
    #[error("{method} failed: {message}")]
    Server {
        /// The method that failed.
        method: String,
        /// The error text reported by the server.
        message: String,
    },

    /// The server sent something that is not a valid response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl RpcError {
    /// The server-reported message, when this is a server-side rejection.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            RpcError::Server { message, .. } => Some(message),
            _ => None,
        }
    }
}
