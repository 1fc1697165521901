//! Unified error type for the DQM4hep network fabric.
//!
//! Every component in `dqm-transport`, `dqm-netmgr` and `dqm-hub` returns
//! [`NetError`] through [`NetResult`]. Binaries in `dqm-cli` compose these
//! with `anyhow` at the top level — typed errors stay in the libraries,
//! `anyhow::Result` only at the runtime/binary boundary.

use thiserror::Error;

/// Error kinds shared by every networking component.
#[derive(Debug, Clone, Error)]
pub enum NetError {
    /// A caller-supplied argument violates a precondition (bad port, bad route).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// An operation was attempted before required setup (connect without config).
    #[error("not initialized: {0}")]
    NotInitialized(String),

    /// A resource that must be unique already exists (double bind, duplicate name).
    #[error("already initialized: {0}")]
    AlreadyInitialized(String),

    /// An operation that requires the absence of existing state found one present.
    #[error("already present: {0}")]
    AlreadyPresent(String),

    /// The referenced resource does not exist (unknown connection, unknown service).
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation is not permitted in the current state.
    #[error("not allowed: {0}")]
    NotAllowed(String),

    /// The underlying transport failed (DNS, connection refused, peer reset).
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// A frame or message violated the wire protocol.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// An unexpected internal failure (should not normally surface to callers).
    #[error("internal failure: {0}")]
    InternalFailure(String),
}

impl From<std::io::Error> for NetError {
    fn from(err: std::io::Error) -> Self {
        Self::TransportFailure(err.to_string())
    }
}

impl From<serde_json::Error> for NetError {
    fn from(err: serde_json::Error) -> Self {
        Self::ProtocolError(err.to_string())
    }
}

/// Result type used throughout the network fabric.
pub type NetResult<T> = Result<T, NetError>;
