//! Error types for Stratum v1 client operations.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StratumError {
    /// Dial, TLS handshake, or socket I/O failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// Reply had an unexpected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Pool rejected `mining.authorize`.
    #[error("authorization rejected: {0}")]
    Auth(String),

    /// Pool answered with a JSON-RPC error object.
    #[error("{method}: {message}")]
    Rpc { method: String, message: String },

    /// No reply within the per-call bound.
    #[error("{0}: timeout")]
    Timeout(String),

    /// Call issued before connect or after close.
    #[error("not connected")]
    NotConnected,

    /// Connection closed while a call was waiting for its reply.
    #[error("connection closed")]
    Closed,
}

impl From<std::io::Error> for StratumError {
    fn from(e: std::io::Error) -> Self {
        StratumError::Connection(e.to_string())
    }
}

pub type StratumResult<T> = Result<T, StratumError>;
