//! Socket provider backed by Tokio TCP streams and `tokio-rustls`.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::channel::mpsc as event_channel;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

#[cfg(feature = "tls")]
use std::sync::Arc;
#[cfg(feature = "tls")]
use tokio_rustls::rustls;

use super::{ConnectFailure, ConnectOptions, Connection, Socket, SocketEvent};
use crate::runtime;

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Opens connections with `tokio::net::TcpStream`, wrapping them in TLS
/// for secure requests.
///
/// Each connection is driven by one spawned task, so the provider must be
/// used from within a Tokio runtime.
#[derive(Clone)]
pub struct TokioSocketProvider {
    #[cfg(feature = "tls")]
    tls: tokio_rustls::TlsConnector,
}

impl TokioSocketProvider {
    /// Create a provider trusting the `webpki-roots` certificate set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "tls")]
            tls: tokio_rustls::TlsConnector::from(default_tls_config()),
        }
    }

    /// Create a provider with a custom TLS client configuration.
    #[cfg(feature = "tls")]
    #[must_use]
    pub fn with_tls_config(config: Arc<rustls::ClientConfig>) -> Self {
        Self {
            tls: tokio_rustls::TlsConnector::from(config),
        }
    }

    fn open(&self, options: &ConnectOptions, secure: bool) -> Socket {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (destroy_tx, destroy_rx) = watch::channel(false);
        let (event_tx, event_rx) = event_channel::unbounded();

        let task = SocketTask {
            dialer: Dialer {
                options: options.clone(),
                secure,
                #[cfg(feature = "tls")]
                tls: self.tls.clone(),
            },
            commands: command_rx,
            destroyed: destroy_rx,
            events: event_tx,
        };
        runtime::spawn(task.run());

        Socket::new(
            Box::new(TokioConnection {
                commands: command_tx,
                destroy: destroy_tx,
            }),
            event_rx.boxed(),
        )
    }
}

impl Default for TokioSocketProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TokioSocketProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioSocketProvider")
            .field("tls", &cfg!(feature = "tls"))
            .finish()
    }
}

impl super::SocketProvider for TokioSocketProvider {
    fn connect_plain(&self, options: &ConnectOptions) -> Socket {
        self.open(options, false)
    }

    fn connect_secure(&self, options: &ConnectOptions) -> Socket {
        self.open(options, true)
    }
}

#[cfg(feature = "tls")]
fn default_tls_config() -> Arc<rustls::ClientConfig> {
    let roots = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Arc::new(config)
}

enum Command {
    Write(Bytes),
    End,
}

struct TokioConnection {
    commands: mpsc::UnboundedSender<Command>,
    destroy: watch::Sender<bool>,
}

impl Connection for TokioConnection {
    // A closed channel means the task already exited and reported Close.
    fn write(&mut self, data: Bytes) {
        let _ = self.commands.send(Command::Write(data));
    }

    fn end(&mut self) {
        let _ = self.commands.send(Command::End);
    }

    // Signalled out of band so a write stuck on a full send buffer is
    // abandoned too.
    fn destroy(&mut self) {
        self.destroy.send_replace(true);
    }
}

/// A plain or TLS stream.
enum HttpStream {
    Plain(TcpStream),
    #[cfg(feature = "tls")]
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl AsyncRead for HttpStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(feature = "tls")]
            Self::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for HttpStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(feature = "tls")]
            Self::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_flush(cx),
            #[cfg(feature = "tls")]
            Self::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(feature = "tls")]
            Self::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

struct SocketTask {
    dialer: Dialer,
    commands: mpsc::UnboundedReceiver<Command>,
    destroyed: watch::Receiver<bool>,
    events: event_channel::UnboundedSender<SocketEvent>,
}

impl SocketTask {
    async fn run(mut self) {
        // Writes are buffered by the caller until Connect, so commands can
        // wait in the channel while dialing.
        let opened = tokio::select! {
            result = self.dialer.open() => Some(result),
            () = destroyed(&mut self.destroyed) => None,
        };

        let stream = match opened {
            Some(Ok(stream)) => stream,
            Some(Err(err)) => {
                emit(&self.events, SocketEvent::Error(err));
                emit(&self.events, SocketEvent::Close);
                return;
            }
            None => {
                emit(&self.events, SocketEvent::Close);
                return;
            }
        };

        if !emit(&self.events, SocketEvent::Connect) {
            return;
        }

        let (reader, writer) = tokio::io::split(stream);
        let result = tokio::select! {
            result = read_loop(reader, &self.events) => result,
            result = write_loop(writer, &mut self.commands) => result,
            () = destroyed(&mut self.destroyed) => Ok(()),
        };
        if let Err(err) = result {
            emit(&self.events, SocketEvent::Error(err));
        }
        emit(&self.events, SocketEvent::Close);
    }
}

fn emit(events: &event_channel::UnboundedSender<SocketEvent>, event: SocketEvent) -> bool {
    events.unbounded_send(event).is_ok()
}

/// Resolves once the connection is destroyed or its handle dropped.
async fn destroyed(signal: &mut watch::Receiver<bool>) {
    let _ = signal.wait_for(|destroyed| *destroyed).await;
}

struct Dialer {
    options: ConnectOptions,
    secure: bool,
    #[cfg(feature = "tls")]
    tls: tokio_rustls::TlsConnector,
}

impl Dialer {
    async fn open(&self) -> io::Result<HttpStream> {
        let options = &self.options;
        let connect = TcpStream::connect((options.host.as_str(), options.port));
        let tcp = match options.timeout {
            Some(duration) => runtime::timeout(duration, connect)
                .await
                .map_err(|elapsed| ConnectFailure::Timeout(elapsed.duration))??,
            None => connect.await?,
        };
        tcp.set_nodelay(options.no_delay)?;

        if !self.secure {
            return Ok(HttpStream::Plain(tcp));
        }
        self.handshake(tcp).await
    }

    #[cfg(feature = "tls")]
    async fn handshake(&self, tcp: TcpStream) -> io::Result<HttpStream> {
        let name = rustls::pki_types::ServerName::try_from(self.options.host.clone())
            .map_err(|e| ConnectFailure::Tls(format!("invalid server name: {e}")))?;
        let stream = self
            .tls
            .connect(name, tcp)
            .await
            .map_err(|e| ConnectFailure::Tls(e.to_string()))?;
        Ok(HttpStream::Tls(Box::new(stream)))
    }

    #[cfg(not(feature = "tls"))]
    async fn handshake(&self, _tcp: TcpStream) -> io::Result<HttpStream> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "secure connections require the `tls` feature",
        ))
    }
}

/// Forward inbound bytes until the peer closes or a read fails.
async fn read_loop(
    mut reader: ReadHalf<HttpStream>,
    events: &event_channel::UnboundedSender<SocketEvent>,
) -> io::Result<()> {
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
    loop {
        buf.reserve(READ_BUFFER_SIZE);
        if reader.read_buf(&mut buf).await? == 0 {
            return Ok(());
        }
        if !emit(events, SocketEvent::Data(buf.split().freeze())) {
            return Ok(());
        }
    }
}

/// Drain queued writes. Runs alongside [`read_loop`], so a blocked write
/// never stops inbound data.
async fn write_loop(
    mut writer: WriteHalf<HttpStream>,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> io::Result<()> {
    while let Some(command) = commands.recv().await {
        match command {
            Command::Write(data) => writer.write_all(&data).await?,
            Command::End => writer.shutdown().await?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::SocketProvider;
    use tokio::net::TcpListener;

    async fn next_event(socket: &mut Socket) -> Option<SocketEvent> {
        tokio::time::timeout(std::time::Duration::from_secs(5), socket.events.next())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_plain_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(&buf).await.unwrap();
        });

        let provider = TokioSocketProvider::new();
        let mut socket = provider.connect_plain(&ConnectOptions::new("127.0.0.1", port));

        assert!(matches!(next_event(&mut socket).await, Some(SocketEvent::Connect)));
        socket.connection.write(Bytes::from_static(b"ping"));

        let mut echoed = Vec::new();
        loop {
            match next_event(&mut socket).await {
                Some(SocketEvent::Data(data)) => echoed.extend_from_slice(&data),
                Some(SocketEvent::Close) | None => break,
                Some(other) => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(echoed, b"ping");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused_reports_error_then_close() {
        // Bind and drop to get a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let provider = TokioSocketProvider::new();
        let mut socket = provider.connect_plain(&ConnectOptions::new("127.0.0.1", port));

        assert!(matches!(next_event(&mut socket).await, Some(SocketEvent::Error(_))));
        assert!(matches!(next_event(&mut socket).await, Some(SocketEvent::Close)));
    }

    #[tokio::test]
    async fn test_destroy_closes_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            drop(stream);
        });

        let provider = TokioSocketProvider::new();
        let mut socket = provider.connect_plain(&ConnectOptions::new("127.0.0.1", port));
        assert!(matches!(next_event(&mut socket).await, Some(SocketEvent::Connect)));

        socket.connection.destroy();
        assert!(matches!(next_event(&mut socket).await, Some(SocketEvent::Close)));
    }

    #[tokio::test]
    async fn test_large_duplex_stream_does_not_stall() {
        const BLOCK: usize = 1024 * 1024;
        const BLOCKS: usize = 16;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let (mut reader, mut writer) = stream.split();
            let _ = tokio::io::copy(&mut reader, &mut writer).await;
        });

        let provider = TokioSocketProvider::new();
        let mut socket = provider.connect_plain(&ConnectOptions::new("127.0.0.1", port));
        assert!(matches!(next_event(&mut socket).await, Some(SocketEvent::Connect)));

        // Far more than both kernel buffers hold, so the echo only drains if
        // reads keep going while writes are blocked.
        for _ in 0..BLOCKS {
            socket.connection.write(Bytes::from(vec![7u8; BLOCK]));
        }

        let mut received = 0;
        while received < BLOCK * BLOCKS {
            match next_event(&mut socket).await {
                Some(SocketEvent::Data(data)) => {
                    assert!(data.iter().all(|byte| *byte == 7));
                    received += data.len();
                }
                other => panic!("unexpected event after {received} bytes: {other:?}"),
            }
        }
        assert_eq!(received, BLOCK * BLOCKS);

        socket.connection.destroy();
        assert!(matches!(next_event(&mut socket).await, Some(SocketEvent::Close)));
    }

    #[tokio::test]
    async fn test_destroy_abandons_blocked_write() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // Accepts but never reads.
        let _server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            drop(stream);
        });

        let provider = TokioSocketProvider::new();
        let mut socket = provider.connect_plain(&ConnectOptions::new("127.0.0.1", port));
        assert!(matches!(next_event(&mut socket).await, Some(SocketEvent::Connect)));

        socket.connection.write(Bytes::from(vec![0u8; 64 * 1024 * 1024]));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        socket.connection.destroy();
        assert!(matches!(next_event(&mut socket).await, Some(SocketEvent::Close)));
    }

    #[cfg(feature = "tls")]
    #[tokio::test]
    async fn test_failed_handshake_is_a_tls_error() {
        use crate::TransportError;
        use rpcwire_core::TransportErrorKind;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // A plain HTTP server answering the ClientHello.
        let _server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 512];
            let _ = stream.read(&mut buf).await;
            let _ = stream
                .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n")
                .await;
        });

        let provider = TokioSocketProvider::new();
        let mut socket = provider.connect_secure(&ConnectOptions::new("localhost", port));

        let Some(SocketEvent::Error(err)) = next_event(&mut socket).await else {
            panic!("expected a handshake error");
        };
        let err = TransportError::from(err);
        assert_eq!(err.kind(), TransportErrorKind::TlsError);
        assert!(matches!(next_event(&mut socket).await, Some(SocketEvent::Close)));
    }
}
