//! Scripted sockets and recording handlers.
//!
//! [`MockSocketProvider`] stands in for the network: every connection it
//! opens records what the transport writes and lets the test push socket
//! events back. [`RecordingHandler`] captures what a transport reports.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::channel::mpsc;
use rpcwire_core::{Metadata, TransportErrorKind};
use rpcwire_transport::socket::{ConnectOptions, Connection, Socket, SocketEvent, SocketProvider};
use rpcwire_transport::{TransportError, TransportHandler};

use crate::async_helpers::{DEFAULT_TIMEOUT, wait_for};

const POLL_INTERVAL: Duration = Duration::from_millis(2);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct SocketLog {
    writes: Vec<Bytes>,
    ended: bool,
    destroyed: bool,
}

/// Test-side handle to one connection opened by a [`MockSocketProvider`].
#[derive(Debug, Clone)]
pub struct MockSocket {
    options: ConnectOptions,
    secure: bool,
    log: Arc<Mutex<SocketLog>>,
    events: mpsc::UnboundedSender<SocketEvent>,
}

impl MockSocket {
    /// Options the transport connected with.
    #[must_use]
    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    /// Whether a TLS connection was requested.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Push an event to the transport. Returns `false` once the socket is closed.
    pub fn emit(&self, event: SocketEvent) -> bool {
        self.events.unbounded_send(event).is_ok()
    }

    /// Announce the connection as established.
    pub fn connect(&self) {
        self.emit(SocketEvent::Connect);
    }

    /// Deliver bytes from the peer.
    pub fn receive(&self, data: impl Into<Bytes>) {
        self.emit(SocketEvent::Data(data.into()));
    }

    /// Fail the connection with `kind`, then close it.
    pub fn fail(&self, kind: io::ErrorKind) {
        self.fail_with(io::Error::from(kind));
    }

    /// Fail the connection with `error`, then close it.
    pub fn fail_with(&self, error: io::Error) {
        self.emit(SocketEvent::Error(error));
        self.close();
    }

    /// Close the connection from the peer side.
    pub fn close(&self) {
        self.emit(SocketEvent::Close);
        self.events.close_channel();
    }

    /// Every buffer the transport wrote, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<Bytes> {
        lock(&self.log).writes.clone()
    }

    /// Everything the transport wrote, concatenated.
    #[must_use]
    pub fn written(&self) -> Bytes {
        let log = lock(&self.log);
        let mut out = BytesMut::new();
        for write in &log.writes {
            out.extend_from_slice(write);
        }
        out.freeze()
    }

    /// [`written`](Self::written) as text.
    #[must_use]
    pub fn written_string(&self) -> String {
        String::from_utf8_lossy(&self.written()).into_owned()
    }

    /// Whether the transport half-closed the connection.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        lock(&self.log).ended
    }

    /// Whether the transport tore the connection down.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        lock(&self.log).destroyed
    }

    /// Wait until at least `count` buffers have been written.
    pub async fn wait_for_writes(&self, count: usize) {
        wait_for(DEFAULT_TIMEOUT, POLL_INTERVAL, || lock(&self.log).writes.len() >= count).await;
    }

    /// Wait until the transport half-closes the connection.
    pub async fn wait_for_end(&self) {
        wait_for(DEFAULT_TIMEOUT, POLL_INTERVAL, || self.is_ended()).await;
    }
}

struct MockConnection {
    log: Arc<Mutex<SocketLog>>,
    events: mpsc::UnboundedSender<SocketEvent>,
}

impl Connection for MockConnection {
    fn write(&mut self, data: Bytes) {
        let mut log = lock(&self.log);
        if !log.destroyed {
            log.writes.push(data);
        }
    }

    fn end(&mut self) {
        lock(&self.log).ended = true;
    }

    fn destroy(&mut self) {
        let mut log = lock(&self.log);
        if log.destroyed {
            return;
        }
        log.destroyed = true;
        drop(log);
        let _ = self.events.unbounded_send(SocketEvent::Close);
        self.events.close_channel();
    }
}

/// A [`SocketProvider`] whose connections are driven by the test.
///
/// # Example
///
/// ```rust
/// use rpcwire_testing::MockSocketProvider;
/// use rpcwire_transport::socket::{ConnectOptions, SocketProvider};
///
/// let provider = MockSocketProvider::new();
/// let _socket = provider.connect_plain(&ConnectOptions::new("localhost", 8080));
///
/// let mock = provider.last_socket().unwrap();
/// assert_eq!(mock.options().port, 8080);
/// assert!(!mock.is_secure());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockSocketProvider {
    sockets: Arc<Mutex<Vec<MockSocket>>>,
    auto_connect: bool,
}

impl MockSocketProvider {
    /// A provider whose sockets stay connecting until the test says otherwise.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce every new socket as connected right away.
    pub fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    /// Every socket opened so far.
    #[must_use]
    pub fn sockets(&self) -> Vec<MockSocket> {
        lock(&self.sockets).clone()
    }

    /// The most recently opened socket.
    #[must_use]
    pub fn last_socket(&self) -> Option<MockSocket> {
        lock(&self.sockets).last().cloned()
    }

    /// Number of sockets opened so far.
    #[must_use]
    pub fn socket_count(&self) -> usize {
        lock(&self.sockets).len()
    }

    fn open(&self, options: &ConnectOptions, secure: bool) -> Socket {
        let (tx, rx) = mpsc::unbounded();
        let log = Arc::new(Mutex::new(SocketLog::default()));
        let mock = MockSocket {
            options: options.clone(),
            secure,
            log: Arc::clone(&log),
            events: tx.clone(),
        };
        if self.auto_connect {
            mock.connect();
        }
        lock(&self.sockets).push(mock);

        Socket::new(Box::new(MockConnection { log, events: tx }), rx.boxed())
    }
}

impl SocketProvider for MockSocketProvider {
    fn connect_plain(&self, options: &ConnectOptions) -> Socket {
        self.open(options, false)
    }

    fn connect_secure(&self, options: &ConnectOptions) -> Socket {
        self.open(options, true)
    }
}

/// An error as a [`RecordingHandler`] saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedError {
    /// Classification of the error.
    pub kind: TransportErrorKind,
    /// The error's display text.
    pub message: String,
}

impl From<&TransportError> for RecordedError {
    fn from(error: &TransportError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// One callback received by a [`RecordingHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// `on_headers`.
    Headers {
        /// Response metadata.
        metadata: Metadata,
        /// HTTP status code.
        status: u16,
    },
    /// `on_chunk`.
    Chunk(Bytes),
    /// `on_end`.
    End(Option<RecordedError>),
}

/// Shared view of what a [`RecordingHandler`] has received.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<TransportEvent>>>);

impl EventLog {
    /// Events so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<TransportEvent> {
        lock(&self.0).clone()
    }

    /// Response body chunks so far, concatenated.
    #[must_use]
    pub fn body(&self) -> Bytes {
        let events = lock(&self.0);
        let mut out = BytesMut::new();
        for event in events.iter() {
            if let TransportEvent::Chunk(chunk) = event {
                out.extend_from_slice(chunk);
            }
        }
        out.freeze()
    }

    /// The end callback's argument, once it has been called.
    #[must_use]
    pub fn end(&self) -> Option<Option<RecordedError>> {
        lock(&self.0).iter().find_map(|event| match event {
            TransportEvent::End(error) => Some(error.clone()),
            _ => None,
        })
    }

    /// Number of times the end callback ran.
    #[must_use]
    pub fn end_count(&self) -> usize {
        lock(&self.0)
            .iter()
            .filter(|event| matches!(event, TransportEvent::End(_)))
            .count()
    }

    /// Wait for the end callback and return its argument.
    pub async fn wait_for_end(&self) -> Option<RecordedError> {
        wait_for(DEFAULT_TIMEOUT, POLL_INTERVAL, || self.end_count() > 0).await;
        self.end().flatten()
    }

    /// Wait until at least `count` events have arrived.
    pub async fn wait_for_events(&self, count: usize) {
        wait_for(DEFAULT_TIMEOUT, POLL_INTERVAL, || lock(&self.0).len() >= count).await;
    }

    fn push(&self, event: TransportEvent) {
        lock(&self.0).push(event);
    }
}

/// A [`TransportHandler`] that records every callback into an [`EventLog`].
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    log: EventLog,
}

impl RecordingHandler {
    /// A handler and the log it writes to.
    #[must_use]
    pub fn new() -> (Self, EventLog) {
        let handler = Self::default();
        let log = handler.log.clone();
        (handler, log)
    }
}

impl TransportHandler for RecordingHandler {
    fn on_headers(&mut self, metadata: Metadata, status: u16) {
        self.log.push(TransportEvent::Headers { metadata, status });
    }

    fn on_chunk(&mut self, chunk: Bytes) {
        self.log.push(TransportEvent::Chunk(chunk));
    }

    fn on_end(&mut self, error: Option<TransportError>) {
        self.log
            .push(TransportEvent::End(error.as_ref().map(RecordedError::from)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_mock_socket_records_and_emits() {
        let provider = MockSocketProvider::new().with_auto_connect(true);
        let Socket {
            mut connection,
            mut events,
        } = provider.connect_secure(&ConnectOptions::new("h", 443));
        let mock = provider.last_socket().unwrap();
        assert!(mock.is_secure());

        connection.write(Bytes::from_static(b"ab"));
        connection.write(Bytes::from_static(b"c"));
        connection.end();
        assert_eq!(mock.written(), Bytes::from_static(b"abc"));
        assert!(mock.is_ended());

        mock.receive(&b"reply"[..]);
        assert!(matches!(events.next().await, Some(SocketEvent::Connect)));
        assert!(matches!(events.next().await, Some(SocketEvent::Data(d)) if d == "reply"));
    }

    #[tokio::test]
    async fn test_destroy_emits_close_once() {
        let provider = MockSocketProvider::new();
        let Socket {
            mut connection,
            mut events,
        } = provider.connect_plain(&ConnectOptions::new("h", 80));
        let mock = provider.last_socket().unwrap();

        connection.destroy();
        connection.destroy();
        connection.write(Bytes::from_static(b"late"));

        assert!(mock.is_destroyed());
        assert!(mock.writes().is_empty());
        assert!(matches!(events.next().await, Some(SocketEvent::Close)));
        assert!(events.next().await.is_none());
        assert!(!mock.emit(SocketEvent::Connect));
    }

    #[test]
    fn test_recording_handler() {
        let (mut handler, log) = RecordingHandler::new();
        handler.on_headers(Metadata::new(), 200);
        handler.on_chunk(Bytes::from_static(b"a"));
        handler.on_chunk(Bytes::from_static(b"b"));
        handler.on_end(Some(TransportError::Cancelled));

        assert_eq!(log.body(), Bytes::from_static(b"ab"));
        assert_eq!(log.end_count(), 1);
        let error = log.end().flatten().unwrap();
        assert_eq!(error.kind, TransportErrorKind::Cancelled);
        assert_eq!(log.events().len(), 4);
    }
}
