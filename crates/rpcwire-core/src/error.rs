//! Transport error classification.
//!
//! Transports report failures through their own error types; this module
//! provides the shared classification every one of them maps into, so the
//! calling RPC layer can decide on retry policy without knowing which
//! strategy was selected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// Connection could not be established.
    ConnectionFailed,
    /// Connection was closed unexpectedly or is already closed.
    ConnectionClosed,
    /// Read operation failed.
    ReadFailed,
    /// Write operation failed.
    WriteFailed,
    /// TLS/SSL error occurred.
    TlsError,
    /// Operation timed out.
    Timeout,
    /// Message format was invalid.
    InvalidMessage,
    /// The caller broke the transport's usage contract.
    ProtocolViolation,
    /// The exchange was cancelled by the caller.
    Cancelled,
    /// The transport was configured in a way it cannot honor.
    InvalidConfiguration,
}

impl TransportErrorKind {
    /// Whether the failure originated on the network rather than from the caller.
    ///
    /// The transports never retry; this is a hint for the RPC layer above.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed
                | Self::ConnectionClosed
                | Self::ReadFailed
                | Self::WriteFailed
                | Self::TlsError
                | Self::Timeout
        )
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed => write!(f, "connection failed"),
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::ReadFailed => write!(f, "read failed"),
            Self::WriteFailed => write!(f, "write failed"),
            Self::TlsError => write!(f, "TLS error"),
            Self::Timeout => write!(f, "timeout"),
            Self::InvalidMessage => write!(f, "invalid message"),
            Self::ProtocolViolation => write!(f, "protocol violation"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::InvalidConfiguration => write!(f, "invalid configuration"),
        }
    }
}
