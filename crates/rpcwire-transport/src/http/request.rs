//! One HTTP/1.1 exchange over a raw socket.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tracing::Instrument;
use url::{Host, Url};

use super::head::{Framing, RequestWriter, validate_header};
use super::parser::{HeaderList, ParseEvent, ResponseHead, ResponseParser};
use crate::error::TransportError;
use crate::gate::DispatchGate;
use crate::logging::{Logger, call_log};
use crate::runtime;
use crate::socket::{ConnectOptions, Connection, Socket, SocketEvent, SocketEvents, SocketProvider};

/// Where and how to send a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    /// Host name or address, without brackets for IPv6.
    pub host: String,
    /// Explicit port; `None` means the scheme default.
    pub port: Option<u16>,
    /// Path and query.
    pub path: String,
    /// Request method.
    pub method: String,
    /// Headers sent after `Host`, in order.
    pub headers: Vec<(String, String)>,
    /// Use TLS.
    pub secure: bool,
    /// Disable Nagle's algorithm on the socket.
    pub no_delay: bool,
    /// Upper bound on connection establishment.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// A plain `POST /` to `host` on the default port.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            path: "/".to_string(),
            method: "POST".to_string(),
            headers: Vec::new(),
            secure: false,
            no_delay: true,
            timeout: None,
        }
    }

    /// Derive host, port, path and security from an `http` or `https` URL.
    pub fn from_url(url: &Url) -> Result<Self, TransportError> {
        let secure = match url.scheme() {
            "http" => false,
            "https" => true,
            other => {
                return Err(TransportError::invalid_url(
                    url.as_str(),
                    format!("unsupported scheme {other:?}"),
                ));
            }
        };
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(TransportError::invalid_url(url.as_str(), "missing host")),
        };

        let mut path = url.path().to_string();
        if path.is_empty() {
            path.push('/');
        }
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        Ok(Self {
            port: url.port(),
            path,
            secure,
            ..Self::new(host)
        })
    }

    /// Set the port.
    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    /// Set the path and query.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the request method.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Append a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Append several headers.
    pub fn with_headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Use TLS.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set the no-delay flag.
    pub fn with_no_delay(mut self, no_delay: bool) -> Self {
        self.no_delay = no_delay;
        self
    }

    /// Set the connect timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check every header without opening anything.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidHeader`] for the first header that
    /// cannot be placed on the wire.
    pub fn validate(&self) -> Result<(), TransportError> {
        self.headers
            .iter()
            .try_for_each(|(name, value)| validate_header(name, value))
    }

    /// The port actually dialed.
    #[must_use]
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.default_port())
    }

    /// Value of the `Host` header: the port is included only when it is not
    /// the scheme default.
    #[must_use]
    pub fn host_header(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        match self.port {
            Some(port) if port != self.default_port() => format!("{host}:{port}"),
            _ => host,
        }
    }

    /// Parameters for the socket provider.
    #[must_use]
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions::new(self.host.clone(), self.effective_port())
            .with_no_delay(self.no_delay)
            .with_timeout(self.timeout)
    }

    fn default_port(&self) -> u16 {
        if self.secure { 443 } else { 80 }
    }
}

/// Receives the outcome of an [`HttpRequest`].
///
/// `on_end` is called exactly once, last. `on_error`, when called, comes
/// right before it.
pub trait ResponseHandler: Send {
    /// The exchange failed.
    fn on_error(&mut self, error: TransportError);

    /// The response head arrived.
    fn on_headers(&mut self, head: ResponseHead);

    /// A run of response body bytes arrived.
    fn on_data(&mut self, chunk: Bytes);

    /// Trailer fields followed a chunked body.
    fn on_trailers(&mut self, trailers: HeaderList) {
        let _ = trailers;
    }

    /// The exchange is over.
    fn on_end(&mut self);
}

type ErrorCallback = Box<dyn FnMut(TransportError) + Send>;
type HeadersCallback = Box<dyn FnMut(ResponseHead) + Send>;
type DataCallback = Box<dyn FnMut(Bytes) + Send>;
type EndCallback = Box<dyn FnMut() + Send>;

/// A [`ResponseHandler`] assembled from closures.
///
/// Each event has one slot; registering again replaces the callback.
#[derive(Default)]
pub struct ResponseCallbacks {
    on_error: Option<ErrorCallback>,
    on_headers: Option<HeadersCallback>,
    on_data: Option<DataCallback>,
    on_end: Option<EndCallback>,
}

impl ResponseCallbacks {
    /// Callbacks that ignore everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to errors.
    pub fn on_error(mut self, f: impl FnMut(TransportError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Subscribe to the response head.
    pub fn on_headers(mut self, f: impl FnMut(ResponseHead) + Send + 'static) -> Self {
        self.on_headers = Some(Box::new(f));
        self
    }

    /// Subscribe to body chunks.
    pub fn on_data(mut self, f: impl FnMut(Bytes) + Send + 'static) -> Self {
        self.on_data = Some(Box::new(f));
        self
    }

    /// Subscribe to the end of the exchange.
    pub fn on_end(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_end = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for ResponseCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCallbacks")
            .field("on_error", &self.on_error.is_some())
            .field("on_headers", &self.on_headers.is_some())
            .field("on_data", &self.on_data.is_some())
            .field("on_end", &self.on_end.is_some())
            .finish()
    }
}

impl ResponseHandler for ResponseCallbacks {
    fn on_error(&mut self, error: TransportError) {
        if let Some(f) = &mut self.on_error {
            f(error);
        }
    }

    fn on_headers(&mut self, head: ResponseHead) {
        if let Some(f) = &mut self.on_headers {
            f(head);
        }
    }

    fn on_data(&mut self, chunk: Bytes) {
        if let Some(f) = &mut self.on_data {
            f(chunk);
        }
    }

    fn on_end(&mut self) {
        if let Some(f) = &mut self.on_end {
            f();
        }
    }
}

/// Lifecycle of the underlying connection. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for the socket; writes are queued.
    Connecting,
    /// Writes go straight to the socket.
    Connected,
    /// No more writes are accepted.
    Closed,
}

#[derive(Debug)]
enum ResponseEvent {
    Error(TransportError),
    Headers(ResponseHead),
    Data(Bytes),
    Trailers(HeaderList),
    End,
}

/// Connection state machine for one exchange. Performs no I/O of its own:
/// socket events go in, handler events come out.
struct RequestState {
    writer: RequestWriter,
    connection: Box<dyn Connection>,
    conn: ConnectionState,
    pending_writes: Vec<Bytes>,
    pending_end: bool,
    socket_ended: bool,
    socket_destroyed: bool,
    destroyed: bool,
    finished: bool,
    parser: ResponseParser,
    logger: Logger,
}

impl RequestState {
    fn new(writer: RequestWriter, connection: Box<dyn Connection>, logger: Logger) -> Self {
        Self {
            writer,
            connection,
            conn: ConnectionState::Connecting,
            pending_writes: Vec::new(),
            pending_end: false,
            socket_ended: false,
            socket_destroyed: false,
            destroyed: false,
            finished: false,
            parser: ResponseParser::new(),
            logger,
        }
    }

    fn write_header(&mut self, name: &str, value: &str) -> Result<(), TransportError> {
        self.writer.write_header(name, value)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.conn == ConnectionState::Closed {
            return Err(TransportError::ClosedWrite);
        }
        let sends_head = !self.writer.init_sent();
        let segments = self.writer.write(data);
        if sends_head {
            call_log!(self.logger, framing = ?self.writer.framing(), "sent init data");
        }
        self.send(segments)
    }

    fn finish_write(&mut self) -> Result<(), TransportError> {
        // The response may complete before the caller finishes sending.
        if self.finished {
            return Ok(());
        }
        let segments = self.writer.finish();
        if segments.is_empty() {
            return Ok(());
        }
        self.send(segments)
    }

    fn send(&mut self, segments: Vec<Bytes>) -> Result<(), TransportError> {
        match self.conn {
            ConnectionState::Closed => Err(TransportError::ClosedWrite),
            ConnectionState::Connecting => {
                self.pending_writes.extend(segments);
                Ok(())
            }
            ConnectionState::Connected => {
                for segment in segments {
                    self.connection.write(segment);
                }
                Ok(())
            }
        }
    }

    fn end(&mut self) {
        match self.conn {
            ConnectionState::Connecting => {
                call_log!(self.logger, "pending end");
                self.pending_end = true;
            }
            ConnectionState::Connected => self.end_socket(),
            ConnectionState::Closed => {}
        }
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.abort_socket();
    }

    fn on_socket_event(&mut self, event: SocketEvent) -> Vec<ResponseEvent> {
        if self.finished {
            return Vec::new();
        }
        match event {
            SocketEvent::Connect => {
                self.on_connect();
                Vec::new()
            }
            SocketEvent::Data(data) => self.on_data(&data),
            SocketEvent::Error(err) => {
                self.conn = ConnectionState::Closed;
                if self.destroyed {
                    self.fail(TransportError::Cancelled)
                } else {
                    self.fail(TransportError::from(err))
                }
            }
            SocketEvent::Close => self.on_close(),
        }
    }

    fn on_connect(&mut self) {
        if self.conn != ConnectionState::Connecting {
            return;
        }
        call_log!(self.logger, queued = self.pending_writes.len(), "connected");
        self.conn = ConnectionState::Connected;
        for segment in self.pending_writes.drain(..) {
            self.connection.write(segment);
        }
        if self.pending_end {
            self.pending_end = false;
            self.end_socket();
        }
    }

    fn on_data(&mut self, data: &[u8]) -> Vec<ResponseEvent> {
        if self.destroyed {
            return Vec::new();
        }
        match self.parser.execute(data) {
            Ok(events) => self.translate(events),
            Err(err) => {
                self.abort_socket();
                self.fail(err)
            }
        }
    }

    fn on_close(&mut self) -> Vec<ResponseEvent> {
        self.conn = ConnectionState::Closed;
        if self.destroyed {
            return self.fail(TransportError::Cancelled);
        }

        let events = self.parser.finish();
        let mut out = self.translate(events);
        if !self.finished {
            call_log!(self.logger, "connection closed before response completed");
            self.finished = true;
            out.push(ResponseEvent::End);
        }
        out
    }

    fn translate(&mut self, events: Vec<ParseEvent>) -> Vec<ResponseEvent> {
        let mut out = Vec::with_capacity(events.len());
        for event in events {
            match event {
                ParseEvent::Headers(head) => {
                    call_log!(self.logger, status = head.status, "recv headers");
                    out.push(ResponseEvent::Headers(head));
                }
                ParseEvent::Body(chunk) => out.push(ResponseEvent::Data(chunk)),
                ParseEvent::Trailers(trailers) => out.push(ResponseEvent::Trailers(trailers)),
                ParseEvent::Complete => {
                    self.end_socket();
                    self.finished = true;
                    out.push(ResponseEvent::End);
                }
            }
        }
        out
    }

    fn fail(&mut self, error: TransportError) -> Vec<ResponseEvent> {
        self.finished = true;
        vec![ResponseEvent::Error(error), ResponseEvent::End]
    }

    fn end_socket(&mut self) {
        self.conn = ConnectionState::Closed;
        if !self.socket_ended && !self.socket_destroyed {
            self.socket_ended = true;
            self.connection.end();
        }
    }

    fn abort_socket(&mut self) {
        self.conn = ConnectionState::Closed;
        self.pending_writes.clear();
        self.pending_end = false;
        if !self.socket_destroyed {
            self.socket_destroyed = true;
            self.connection.destroy();
        }
    }

    /// Drop buffers and the connection once the exchange is over.
    fn release(&mut self) {
        self.abort_socket();
        self.parser = ResponseParser::new();
    }
}

struct Shared {
    state: Mutex<RequestState>,
    gate: DispatchGate,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, RequestState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One outbound HTTP/1.1 exchange.
///
/// Writes issued before the socket connects are queued and flushed in order
/// once it does. The response is delivered to the [`ResponseHandler`] from a
/// background task.
pub struct HttpRequest {
    shared: Arc<Shared>,
}

impl HttpRequest {
    /// Open a connection and prepare the request head.
    ///
    /// The `Host` header and every header in `options` are validated here;
    /// nothing reaches the wire until the first body write.
    pub fn connect(
        options: RequestOptions,
        provider: &dyn SocketProvider,
        handler: impl ResponseHandler + 'static,
        logger: Logger,
    ) -> Result<Self, TransportError> {
        let mut writer =
            RequestWriter::new(&options.method, &options.path, &options.host_header());
        for (name, value) in &options.headers {
            writer.write_header(name, value)?;
        }

        let connect = options.connect_options();
        call_log!(
            logger,
            host = %connect.host,
            port = connect.port,
            "connecting over {}",
            if options.secure { "tls" } else { "tcp" }
        );
        let Socket { connection, events } = if options.secure {
            provider.connect_secure(&connect)
        } else {
            provider.connect_plain(&connect)
        };

        let span = logger.span().clone();
        let shared = Arc::new(Shared {
            state: Mutex::new(RequestState::new(writer, connection, logger)),
            gate: DispatchGate::new(),
        });
        runtime::spawn(drive(Arc::clone(&shared), events, Box::new(handler)).instrument(span));

        Ok(Self { shared })
    }

    /// Add a header to the pending head.
    pub fn write_header(&self, name: &str, value: &str) -> Result<(), TransportError> {
        self.shared.lock().write_header(name, value)
    }

    /// Write body bytes, sending the head first if it has not gone out.
    pub fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        self.shared.lock().write(data)
    }

    /// Terminate the body. Writes the last-chunk marker for chunked bodies.
    pub fn finish_write(&self) -> Result<(), TransportError> {
        self.shared.lock().finish_write()
    }

    /// Close the sending side once queued bytes are out.
    pub fn end(&self) {
        self.shared.lock().end();
    }

    /// Tear the connection down. The handler sees a cancellation error and
    /// then the end of the exchange.
    ///
    /// When this returns, no header or data callback is running or will run,
    /// except the one this is called from. A callback running on another
    /// thread is waited for with a blocking lock, which holds up the calling
    /// thread (a Tokio worker, if called from async code) until it returns.
    pub fn destroy(&self) {
        self.shared.gate.close();
        self.shared.lock().destroy();
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.lock().conn
    }

    /// Body framing chosen so far.
    #[must_use]
    pub fn framing(&self) -> Framing {
        self.shared.lock().writer.framing()
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("state", &self.state())
            .field("framing", &self.framing())
            .field("destroyed", &self.shared.gate.is_closed())
            .finish()
    }
}

async fn drive(shared: Arc<Shared>, mut events: SocketEvents, mut handler: Box<dyn ResponseHandler>) {
    let mut ended = false;
    while let Some(event) = events.next().await {
        let outputs = shared.lock().on_socket_event(event);
        if dispatch(&shared.gate, handler.as_mut(), outputs) {
            ended = true;
            break;
        }
    }

    if !ended {
        // The provider dropped its event stream without a Close.
        let outputs = shared.lock().on_socket_event(SocketEvent::Close);
        dispatch(&shared.gate, handler.as_mut(), outputs);
    }
    shared.lock().release();
}

/// Deliver events to the handler. Returns whether the exchange ended.
fn dispatch(
    gate: &DispatchGate,
    handler: &mut dyn ResponseHandler,
    events: Vec<ResponseEvent>,
) -> bool {
    let mut ended = false;
    for event in events {
        match event {
            ResponseEvent::Headers(head) => {
                gate.pass(|| handler.on_headers(head));
            }
            ResponseEvent::Data(chunk) => {
                gate.pass(|| handler.on_data(chunk));
            }
            ResponseEvent::Trailers(trailers) => {
                gate.pass(|| handler.on_trailers(trailers));
            }
            ResponseEvent::Error(error) => handler.on_error(error),
            ResponseEvent::End => {
                handler.on_end();
                ended = true;
            }
        }
    }
    ended
}
