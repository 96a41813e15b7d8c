//! Duplex byte-stream connections.
//!
//! A [`SocketProvider`] opens a connection and hands back a [`Socket`]: a
//! [`Connection`] handle for outbound bytes plus a stream of
//! [`SocketEvent`]s. The provider never blocks the caller; the connect
//! itself happens in the background and is announced by
//! [`SocketEvent::Connect`].
//!
//! The built-in provider is [`TokioSocketProvider`]. Tests inject a scripted
//! provider instead.

mod tcp;

pub use self::tcp::TokioSocketProvider;

use std::fmt;
use std::io;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;

/// Parameters for opening a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Host name or address to connect to.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Disable Nagle's algorithm.
    pub no_delay: bool,
    /// Upper bound on connection establishment.
    pub timeout: Option<Duration>,
}

impl ConnectOptions {
    /// Create options for `host:port` with no-delay enabled and no timeout.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            no_delay: true,
            timeout: None,
        }
    }

    /// Set the no-delay flag.
    #[must_use]
    pub fn with_no_delay(mut self, no_delay: bool) -> Self {
        self.no_delay = no_delay;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Connect-phase failures a provider wraps in the [`io::Error`] of a
/// [`SocketEvent::Error`].
///
/// `TransportError::from` unwraps them into the `Tls` and `Timeout`
/// variants; any other I/O error is reported as a socket error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectFailure {
    /// The TLS handshake was rejected.
    #[error("TLS handshake failed: {0}")]
    Tls(String),
    /// Connection establishment exceeded the configured timeout.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
}

impl From<ConnectFailure> for io::Error {
    fn from(failure: ConnectFailure) -> Self {
        let kind = match failure {
            ConnectFailure::Tls(_) => io::ErrorKind::InvalidData,
            ConnectFailure::Timeout(_) => io::ErrorKind::TimedOut,
        };
        Self::new(kind, failure)
    }
}

/// Something that happened on a connection.
#[derive(Debug)]
pub enum SocketEvent {
    /// The connection is established and writable.
    Connect,
    /// Bytes arrived from the peer.
    Data(Bytes),
    /// The connection failed. A [`SocketEvent::Close`] normally follows.
    Error(io::Error),
    /// The connection is gone. No further events follow.
    Close,
}

/// Outbound half of a connection.
///
/// All methods are fire-and-forget; failures are reported on the event
/// stream.
pub trait Connection: Send {
    /// Queue bytes for sending.
    fn write(&mut self, data: Bytes);

    /// Half-close after queued bytes are flushed.
    fn end(&mut self);

    /// Tear the connection down immediately.
    fn destroy(&mut self);
}

/// Stream of events for one connection.
pub type SocketEvents = BoxStream<'static, SocketEvent>;

/// A connection handle paired with its event stream.
pub struct Socket {
    /// Outbound half.
    pub connection: Box<dyn Connection>,
    /// Inbound events.
    pub events: SocketEvents,
}

impl Socket {
    /// Pair a connection with its events.
    pub fn new(connection: Box<dyn Connection>, events: SocketEvents) -> Self {
        Self { connection, events }
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket").finish_non_exhaustive()
    }
}

/// Opens plain or TLS connections.
pub trait SocketProvider: Send + Sync + fmt::Debug {
    /// Open a plain TCP connection.
    fn connect_plain(&self, options: &ConnectOptions) -> Socket;

    /// Open a TLS connection, verifying the server as `options.host`.
    fn connect_secure(&self, options: &ConnectOptions) -> Socket;
}
