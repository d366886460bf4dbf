// src/core/errors.rs

//! Defines the primary error type for the entire crate.

use std::io::ErrorKind;
use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures on the cache-read
/// and accounting paths. Using `thiserror` allows for clean error definitions
/// and automatic `From` trait implementations.
#[derive(Error, Debug, Clone)]
pub enum EdgeError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    /// Sentinel returned by storage when no entry exists under a key.
    #[error("cache entry not found")]
    CacheNotFound,

    /// Sentinel returned by storage when a requested byte range cannot be
    /// satisfied by the stored entry.
    #[error("invalid byte range")]
    InvalidRange,

    #[error("invalid cache header line '{0}'")]
    InvalidHeaderLine(String),

    /// A write to the client failed; the peer has usually gone away.
    #[error("writing to client failed")]
    WritingToClient,

    #[error("RPC error: {0}")]
    Rpc(String),

    /// A transport-level RPC failure (connect refused, reset, DNS). These are
    /// retried silently by callers and never logged.
    #[error("RPC connection error: {0}")]
    RpcConnection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for EdgeError {
    fn from(e: std::io::Error) -> Self {
        EdgeError::Io(Arc::new(e))
    }
}

impl EdgeError {
    /// Classifies errors that are expected on a busy edge node and carry no
    /// diagnostic value: client disconnects, resets, and timeouts.
    pub fn can_ignore(&self) -> bool {
        match self {
            EdgeError::WritingToClient => true,
            EdgeError::Io(e) => matches!(
                e.kind(),
                ErrorKind::BrokenPipe
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::TimedOut
                    | ErrorKind::UnexpectedEof
                    | ErrorKind::WriteZero
            ),
            _ => false,
        }
    }

    /// Whether the error is a transport-level RPC failure. Upload loops skip
    /// logging these since the control plane being briefly unreachable is
    /// routine.
    pub fn is_conn_error(&self) -> bool {
        match self {
            EdgeError::RpcConnection(_) => true,
            EdgeError::Io(e) => matches!(
                e.kind(),
                ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}
