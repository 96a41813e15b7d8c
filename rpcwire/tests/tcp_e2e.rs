//! End-to-end tests against a local TCP server.
//!
//! The server is a few lines of hand-written HTTP/1.1 so the tests can check
//! exactly what reaches the wire.

use std::sync::Arc;

use bytes::Bytes;
use pretty_assertions::assert_eq;
use rpcwire::prelude::*;
use rpcwire_testing::{RecordingHandler, TransportEvent, fixtures, with_default_timeout};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

const TERMINATOR: &[u8] = b"0\r\n\r\n";

async fn read_until(stream: &mut TcpStream, needle: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];
    while !buf.windows(needle.len()).any(|w| w == needle) {
        let n = stream.read(&mut tmp).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
    }
    buf
}

/// Serve one request: read until the chunked terminator, reply, close.
async fn serve_once(response: Vec<Bytes>) -> (String, oneshot::Receiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_until(&mut stream, TERMINATOR).await;
        for part in response {
            stream.write_all(&part).await.unwrap();
            stream.flush().await.unwrap();
        }
        stream.shutdown().await.ok();
        tx.send(request).ok();
    });

    (format!("http://{addr}/echo.Echo/Stream"), rx)
}

fn streaming_response() -> Vec<Bytes> {
    vec![
        fixtures::chunked_head(),
        fixtures::chunk(&fixtures::grpc_web_frame(b"one")),
        fixtures::chunk(&fixtures::grpc_web_frame(b"two")),
        fixtures::last_chunk_with_trailers(&[("grpc-status", "0")]),
    ]
}

fn expected_body() -> Vec<u8> {
    let mut body = fixtures::grpc_web_frame(b"one").to_vec();
    body.extend_from_slice(&fixtures::grpc_web_frame(b"two"));
    body
}

#[tokio::test]
async fn test_socket_transport_over_tcp() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();

    let (url, request) = serve_once(streaming_response()).await;
    let factory = common_transport(
        TransportConfig::new()
            .with_environment(Environment::Native)
            .with_strategy(StrategyKind::Socket),
    )
    .unwrap();

    let (handler, log) = RecordingHandler::new();
    let mut transport = factory.make_transport(
        TransportOptions::new(
            url,
            MethodDefinition::bidi_streaming("echo.Echo", "Stream"),
            handler,
        )
        .with_debug(true),
    );

    let mut metadata = Metadata::new();
    metadata.append("content-type", fixtures::GRPC_WEB_CONTENT_TYPE);
    metadata.append("x-user", "a");
    metadata.append("x-user", "b");
    transport.start(metadata).unwrap();
    transport.send_message(fixtures::grpc_web_frame(b"ping")).unwrap();
    transport.finish_send().unwrap();

    assert_eq!(log.wait_for_end().await, None);
    assert_eq!(log.body().to_vec(), expected_body());
    assert!(matches!(
        log.events()[0],
        TransportEvent::Headers { status: 200, .. }
    ));

    let request = String::from_utf8_lossy(&with_default_timeout(request).await.unwrap()).into_owned();
    assert!(request.starts_with("POST /echo.Echo/Stream HTTP/1.1\r\nHost: 127.0.0.1:"));
    assert!(request.contains("x-user: a, b\r\n"));
    assert!(request.contains("Transfer-Encoding: chunked\r\n"));
    assert!(request.ends_with("ping\r\n0\r\n\r\n"));
}

#[tokio::test]
async fn test_connection_refused_reaches_on_end() {
    // Bind then drop to get a port nobody listens on.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let factory = common_transport(TransportConfig::new().with_environment(Environment::Native))
        .unwrap();

    let (handler, log) = RecordingHandler::new();
    let mut transport = factory.make_transport(TransportOptions::new(
        format!("http://{addr}/svc.S/M"),
        MethodDefinition::unary("svc.S", "M"),
        handler,
    ));
    transport.start(Metadata::new()).unwrap();
    transport.send_message(Bytes::from_static(b"x")).unwrap();
    transport.finish_send().unwrap();

    let error = log.wait_for_end().await.unwrap();
    assert_eq!(error.kind, TransportErrorKind::ConnectionFailed);
    assert_eq!(log.events().len(), 1);
}

#[cfg(feature = "fetch")]
#[tokio::test]
async fn test_fetch_transport_over_tcp() {
    let (url, request) = serve_once(streaming_response()).await;
    let factory = common_transport(
        TransportConfig::new()
            .with_environment(Environment::Native)
            .with_strategy(StrategyKind::StreamingFetch),
    )
    .unwrap();

    let (handler, log) = RecordingHandler::new();
    let mut transport = factory.make_transport(TransportOptions::new(
        url,
        MethodDefinition::bidi_streaming("echo.Echo", "Stream"),
        handler,
    ));

    // The body channel exists before start.
    transport.send_message(fixtures::grpc_web_frame(b"early")).unwrap();
    transport.start(Metadata::new()).unwrap();
    transport.send_message(fixtures::grpc_web_frame(b"late")).unwrap();
    transport.finish_send().unwrap();

    assert_eq!(log.wait_for_end().await, None);
    assert_eq!(log.body().to_vec(), expected_body());
    match &log.events()[0] {
        TransportEvent::Headers { metadata, status } => {
            assert_eq!(*status, 200);
            assert_eq!(
                metadata.get_first("content-type"),
                Some(fixtures::GRPC_WEB_CONTENT_TYPE)
            );
        }
        other => panic!("expected headers, got {other:?}"),
    }

    let request = with_default_timeout(request).await.unwrap();
    let text = String::from_utf8_lossy(&request);
    assert!(text.starts_with("POST /echo.Echo/Stream HTTP/1.1\r\n"));
    assert!(text.contains("early"));
    assert!(text.contains("late"));
}

#[tokio::test]
async fn test_factory_is_shareable_across_tasks() {
    let factory: Arc<dyn TransportFactory> =
        common_transport(TransportConfig::new().with_environment(Environment::Native)).unwrap();

    let handle = tokio::spawn({
        let factory = Arc::clone(&factory);
        async move {
            let transport = factory.make_transport(TransportOptions::new(
                "http://localhost/s/m",
                MethodDefinition::unary("s", "m"),
                TransportCallbacks::new(),
            ));
            drop(transport);
        }
    });
    handle.await.unwrap();
}
