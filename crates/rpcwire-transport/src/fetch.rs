//! RPC transport over a streaming HTTP client.
//!
//! The request body is a channel: every `send_message` pushes one message
//! into it and `finish_send` closes it, while `reqwest` streams it to the
//! server. The response is read chunk by chunk as it arrives.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use futures::channel::mpsc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rpcwire_core::Metadata;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use url::Url;

use crate::error::TransportError;
use crate::gate::DispatchGate;
use crate::logging::{Logger, call_error, call_log, generate_request_id};
use crate::runtime;
use crate::traits::{Transport, TransportHandler, TransportOptions};

type BodyItem = Result<Bytes, std::io::Error>;

/// A [`Transport`] backed by a `reqwest` request with a streaming body.
///
/// Messages sent before `start` are buffered and go out first.
pub struct FetchTransport {
    url: String,
    handler: Option<Box<dyn TransportHandler>>,
    client: reqwest::Client,
    body_tx: mpsc::UnboundedSender<BodyItem>,
    body_rx: Option<mpsc::UnboundedReceiver<BodyItem>>,
    cancel: CancellationToken,
    gate: Arc<DispatchGate>,
    logger: Logger,
}

impl FetchTransport {
    /// Prepare a call using `client`.
    pub fn new(options: TransportOptions, client: reqwest::Client, logger: &Logger) -> Self {
        let id = generate_request_id();
        let logger = logger
            .child(&options.method_definition.method_name, &id)
            .with_verbose(options.debug);
        let (body_tx, body_rx) = mpsc::unbounded();

        Self {
            url: options.url,
            handler: Some(options.handler),
            client,
            body_tx,
            body_rx: Some(body_rx),
            cancel: CancellationToken::new(),
            gate: Arc::new(DispatchGate::new()),
            logger,
        }
    }
}

impl fmt::Debug for FetchTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchTransport")
            .field("url", &self.url)
            .field("started", &self.handler.is_none())
            .field("cancelled", &self.gate.is_closed())
            .finish_non_exhaustive()
    }
}

impl Transport for FetchTransport {
    fn start(&mut self, metadata: Metadata) -> Result<(), TransportError> {
        if self.handler.is_none() {
            return Err(TransportError::AlreadyStarted);
        }
        let url = Url::parse(&self.url)
            .map_err(|e| TransportError::invalid_url(&self.url, e.to_string()))?;
        let headers = header_map(&metadata)?;

        let (Some(handler), Some(body)) = (self.handler.take(), self.body_rx.take()) else {
            return Err(TransportError::AlreadyStarted);
        };
        let request = self
            .client
            .post(url)
            .headers(headers)
            .body(reqwest::Body::wrap_stream(body));

        let exchange = Exchange {
            handler,
            gate: Arc::clone(&self.gate),
            body_tx: self.body_tx.clone(),
            logger: self.logger.clone(),
        };
        let span = self.logger.span().clone();
        runtime::spawn(exchange.run(request, self.cancel.clone()).instrument(span));
        Ok(())
    }

    fn send_message(&mut self, message: Bytes) -> Result<(), TransportError> {
        // A closed body means the call already ended; its error went to on_end.
        if let Err(err) = self.body_tx.unbounded_send(Ok(message)) {
            call_error!(self.logger, error = %err, "failed to write message");
        }
        Ok(())
    }

    fn finish_send(&mut self) -> Result<(), TransportError> {
        call_log!(self.logger, "finished write");
        self.body_tx.close_channel();
        Ok(())
    }

    fn cancel(&mut self) {
        call_log!(self.logger, "canceling request");
        self.gate.close();
        self.cancel.cancel();
        self.body_tx.close_channel();
    }
}

struct Exchange {
    handler: Box<dyn TransportHandler>,
    gate: Arc<DispatchGate>,
    body_tx: mpsc::UnboundedSender<BodyItem>,
    logger: Logger,
}

impl Exchange {
    async fn run(mut self, request: reqwest::RequestBuilder, cancel: CancellationToken) {
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(TransportError::Cancelled),
            result = stream_response(request, self.handler.as_mut(), &self.gate, &self.logger) => result,
        };

        match outcome {
            Ok(()) => {
                call_log!(self.logger, "request ended");
                self.handler.on_end(None);
            }
            Err(error) => {
                call_error!(self.logger, error = %error, "error in request");
                self.handler.on_end(Some(error));
                self.body_tx.close_channel();
            }
        }
    }
}

async fn stream_response(
    request: reqwest::RequestBuilder,
    handler: &mut dyn TransportHandler,
    gate: &DispatchGate,
    logger: &Logger,
) -> Result<(), TransportError> {
    let response = request.send().await.map_err(from_reqwest)?;
    let status = response.status().as_u16();
    call_log!(logger, status, "recv headers");

    let metadata = metadata_from_header_map(response.headers());
    gate.pass(|| handler.on_headers(metadata, status));

    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(from_reqwest)?;
        if chunk.is_empty() {
            continue;
        }
        call_log!(logger, bytes = chunk.len(), "received chunk");
        gate.pass(|| handler.on_chunk(chunk));
    }
    Ok(())
}

fn header_map(metadata: &Metadata) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();
    for (name, value) in metadata.to_headers() {
        let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
            return Err(TransportError::InvalidHeader {
                name,
                reason: "name is not an HTTP token",
            });
        };
        let Ok(header_value) = HeaderValue::from_str(&value) else {
            return Err(TransportError::InvalidHeader {
                name,
                reason: "value is not a valid header value",
            });
        };
        headers.append(header_name, header_value);
    }
    Ok(headers)
}

/// Response headers as metadata; values that are not visible ASCII are dropped.
fn metadata_from_header_map(headers: &HeaderMap) -> Metadata {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|value| (name.as_str(), value)))
        .collect()
}

fn from_reqwest(err: reqwest::Error) -> TransportError {
    if err.is_connect() {
        TransportError::Connection {
            message: err.to_string(),
        }
    } else {
        TransportError::stream(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::TransportCallbacks;
    use rpcwire_core::MethodDefinition;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn transport(url: &str, handler: TransportCallbacks) -> FetchTransport {
        FetchTransport::new(
            TransportOptions::new(url, MethodDefinition::bidi_streaming("s", "m"), handler),
            reqwest::Client::new(),
            &Logger::disabled(),
        )
    }

    #[test]
    fn test_header_map_joins_values() {
        let metadata: Metadata = [("x-a", "1"), ("x-a", "2"), ("content-type", "application/grpc-web")]
            .into_iter()
            .collect();
        let headers = header_map(&metadata).unwrap();
        assert_eq!(headers.get("x-a").unwrap(), "1, 2");
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_header_map_rejects_invalid() {
        let metadata: Metadata = [("x-a", "line\nbreak")].into_iter().collect();
        assert!(matches!(
            header_map(&metadata),
            Err(TransportError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn test_metadata_drops_opaque_values() {
        let mut headers = HeaderMap::new();
        headers.insert("x-text", HeaderValue::from_static("ok"));
        headers.insert("x-opaque", HeaderValue::from_bytes(b"\xfa\xfb").unwrap());

        let metadata = metadata_from_header_map(&headers);
        assert_eq!(metadata.get_first("x-text"), Some("ok"));
        assert!(!metadata.contains_key("x-opaque"));
    }

    #[test]
    fn test_send_after_finish_is_swallowed() {
        let mut transport = transport("http://localhost/s/m", TransportCallbacks::new());
        transport.send_message(Bytes::from_static(b"buffered")).unwrap();
        transport.finish_send().unwrap();
        assert!(transport.send_message(Bytes::from_static(b"late")).is_ok());
    }

    #[tokio::test]
    async fn test_cancel_reports_cancelled_end() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and never answer.
        let _server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let (tx, rx) = tokio::sync::oneshot::channel();
        let mut tx = Some(tx);
        let handler = TransportCallbacks::new().on_end(move |error| {
            if let Some(tx) = tx.take() {
                tx.send(error).ok();
            }
        });

        let mut transport = transport(&format!("http://{addr}/s/m"), handler);
        transport.start(Metadata::new()).unwrap();
        assert!(matches!(
            transport.start(Metadata::new()),
            Err(TransportError::AlreadyStarted)
        ));
        transport.cancel();

        let error = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(error, Some(TransportError::Cancelled)));
    }
}
