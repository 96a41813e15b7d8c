//! Transport error types.

use std::time::Duration;

use rpcwire_core::TransportErrorKind;
use thiserror::Error;

use crate::socket::ConnectFailure;

/// Errors that can occur during transport operations.
///
/// Caller bugs (a header after the first body byte, a write after close)
/// are returned synchronously from the offending call. Network failures are
/// reported asynchronously, exactly once, through the call's terminal
/// callback.
#[derive(Error, Debug)]
pub enum TransportError {
    /// A header was written after the request head went out.
    #[error("Cannot write header after init: {name}")]
    HeaderAfterInit {
        /// The rejected header name.
        name: String,
    },

    /// A header name or value cannot be placed on the wire.
    #[error("Invalid header {name:?}: {reason}")]
    InvalidHeader {
        /// The rejected header name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Bytes were written after the connection was closed.
    #[error("Socket is closed")]
    ClosedWrite,

    /// The socket reported an I/O failure.
    #[error("Socket error: {0}")]
    Socket(#[source] std::io::Error),

    /// Connection could not be established.
    #[error("Connection error: {message}")]
    Connection {
        /// Error message.
        message: String,
    },

    /// TLS handshake or configuration failure.
    #[error("TLS error: {message}")]
    Tls {
        /// Error message.
        message: String,
    },

    /// The peer sent bytes that are not a valid HTTP/1.1 response.
    #[error("Invalid HTTP response: {message}")]
    Parse {
        /// Description of the problem.
        message: String,
    },

    /// Reading or writing a streamed body failed.
    #[error("Stream error: {message}")]
    Stream {
        /// Error message.
        message: String,
    },

    /// The exchange was cancelled.
    #[error("Request cancelled")]
    Cancelled,

    /// Timeout occurred.
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// How long the operation waited.
        duration: Duration,
    },

    /// The call URL could not be used.
    #[error("Invalid URL {url:?}: {message}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Why it was rejected.
        message: String,
    },

    /// An operation that needs a started call was invoked before `start`.
    #[error("Transport not started")]
    NotStarted,

    /// `start` was invoked twice on one transport.
    #[error("Transport already started")]
    AlreadyStarted,

    /// The requested strategy is not available in this build or environment.
    #[error("Unsupported: {message}")]
    Unsupported {
        /// Description of what is missing.
        message: String,
    },
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        let failure = err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<ConnectFailure>())
            .cloned();
        match failure {
            Some(ConnectFailure::Tls(message)) => Self::Tls { message },
            Some(ConnectFailure::Timeout(duration)) => Self::Timeout {
                operation: "connect".to_string(),
                duration,
            },
            None => Self::Socket(err),
        }
    }
}

impl TransportError {
    /// Create a response parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create a stream error.
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream {
            message: message.into(),
        }
    }

    /// Create an unsupported-strategy error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Create an invalid URL error.
    pub fn invalid_url(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Get the transport error kind.
    #[must_use]
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            Self::HeaderAfterInit { .. } | Self::InvalidHeader { .. } => {
                TransportErrorKind::ProtocolViolation
            }
            Self::NotStarted | Self::AlreadyStarted => TransportErrorKind::ProtocolViolation,
            Self::ClosedWrite => TransportErrorKind::ConnectionClosed,
            Self::Socket(e) => match e.kind() {
                std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::NotConnected
                | std::io::ErrorKind::AddrNotAvailable => TransportErrorKind::ConnectionFailed,
                std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::UnexpectedEof => TransportErrorKind::ConnectionClosed,
                std::io::ErrorKind::TimedOut => TransportErrorKind::Timeout,
                std::io::ErrorKind::WriteZero => TransportErrorKind::WriteFailed,
                std::io::ErrorKind::Unsupported => TransportErrorKind::InvalidConfiguration,
                _ => TransportErrorKind::ReadFailed,
            },
            Self::Connection { .. } => TransportErrorKind::ConnectionFailed,
            Self::Tls { .. } => TransportErrorKind::TlsError,
            Self::Parse { .. } => TransportErrorKind::InvalidMessage,
            Self::Stream { .. } => TransportErrorKind::ReadFailed,
            Self::Cancelled => TransportErrorKind::Cancelled,
            Self::Timeout { .. } => TransportErrorKind::Timeout,
            Self::InvalidUrl { .. } | Self::Unsupported { .. } => {
                TransportErrorKind::InvalidConfiguration
            }
        }
    }
}
