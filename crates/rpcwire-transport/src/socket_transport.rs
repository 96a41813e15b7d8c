//! RPC transport over the raw-socket HTTP client.
//!
//! Each call gets its own [`HttpRequest`]. Unary calls declare
//! `Content-Length` up front; streaming calls fall back to chunked framing
//! so messages can be written as they are produced.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use rpcwire_core::{Metadata, MethodDefinition};
use url::Url;

use crate::config::SocketSettings;
use crate::error::TransportError;
use crate::http::{HeaderList, HttpRequest, RequestOptions, ResponseHandler, ResponseHead};
use crate::logging::{Logger, call_error, call_log, generate_request_id};
use crate::socket::SocketProvider;
use crate::traits::{Transport, TransportHandler, TransportOptions};

/// Where a call is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Created, not started.
    Idle,
    /// Request opened; messages may be sent.
    Started,
    /// The request body is complete.
    Finished,
    /// The call was cancelled after it started.
    Cancelled,
}

/// A [`Transport`] that speaks HTTP/1.1 directly over a socket.
pub struct SocketTransport {
    url: String,
    method: MethodDefinition,
    handler: Option<Box<dyn TransportHandler>>,
    provider: Arc<dyn SocketProvider>,
    settings: SocketSettings,
    logger: Logger,
    request: Option<HttpRequest>,
    state: CallState,
}

impl SocketTransport {
    /// Prepare a call. Nothing touches the network until `start`.
    pub fn new(
        options: TransportOptions,
        provider: Arc<dyn SocketProvider>,
        settings: SocketSettings,
        logger: &Logger,
    ) -> Self {
        let id = generate_request_id();
        let logger = logger
            .child(&options.method_definition.method_name, &id)
            .with_verbose(options.debug);

        Self {
            url: options.url,
            method: options.method_definition,
            handler: Some(options.handler),
            provider,
            settings,
            logger,
            request: None,
            state: CallState::Idle,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> CallState {
        self.state
    }

    fn request(&self) -> Result<&HttpRequest, TransportError> {
        self.request.as_ref().ok_or(TransportError::NotStarted)
    }
}

impl fmt::Debug for SocketTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketTransport")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("state", &self.state)
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

impl Transport for SocketTransport {
    fn start(&mut self, metadata: Metadata) -> Result<(), TransportError> {
        if self.state != CallState::Idle {
            return Err(TransportError::AlreadyStarted);
        }

        let url = Url::parse(&self.url)
            .map_err(|e| TransportError::invalid_url(&self.url, e.to_string()))?;
        let options = RequestOptions::from_url(&url)?
            .with_method("POST")
            .with_headers(metadata.to_headers())
            .with_no_delay(self.settings.no_delay)
            .with_timeout(self.settings.connect_timeout);
        // A rejected start must leave the handler in place and the call Idle.
        options.validate()?;

        let inner = self.handler.take().ok_or(TransportError::AlreadyStarted)?;
        let handler = CallResponseHandler {
            inner,
            logger: self.logger.clone(),
            ended: false,
        };

        let request = HttpRequest::connect(
            options,
            self.provider.as_ref(),
            handler,
            self.logger.clone(),
        )?;
        self.request = Some(request);
        self.state = CallState::Started;
        Ok(())
    }

    fn send_message(&mut self, message: Bytes) -> Result<(), TransportError> {
        let request = self.request()?;
        if self.method.is_unary() {
            call_log!(self.logger, length = message.len(), "set content length");
            request.write_header("Content-Length", &message.len().to_string())?;
        }
        request.write(&message)
    }

    fn finish_send(&mut self) -> Result<(), TransportError> {
        let request = self.request()?;
        call_log!(self.logger, "finished write");
        request.finish_write()?;
        request.end();
        if self.state == CallState::Started {
            self.state = CallState::Finished;
        }
        Ok(())
    }

    fn cancel(&mut self) {
        call_log!(self.logger, "canceling request");
        if let Some(request) = &self.request {
            request.destroy();
            self.state = CallState::Cancelled;
        }
    }
}

/// Adapts raw response events to the RPC handler.
struct CallResponseHandler {
    inner: Box<dyn TransportHandler>,
    logger: Logger,
    ended: bool,
}

impl CallResponseHandler {
    fn finish(&mut self, error: Option<TransportError>) {
        if !self.ended {
            self.ended = true;
            self.inner.on_end(error);
        }
    }
}

impl ResponseHandler for CallResponseHandler {
    fn on_error(&mut self, error: TransportError) {
        call_error!(self.logger, error = %error, "error in request");
        self.finish(Some(error));
    }

    fn on_headers(&mut self, head: ResponseHead) {
        self.inner
            .on_headers(metadata_from_headers(head.headers), head.status);
    }

    fn on_data(&mut self, chunk: Bytes) {
        call_log!(self.logger, bytes = chunk.len(), "received chunk");
        self.inner.on_chunk(chunk);
    }

    fn on_trailers(&mut self, trailers: HeaderList) {
        call_log!(self.logger, count = trailers.len(), "ignoring trailers");
    }

    fn on_end(&mut self) {
        call_log!(self.logger, "request ended");
        self.finish(None);
    }
}

/// Build metadata from response headers, dropping headers without a value.
pub(crate) fn metadata_from_headers(headers: HeaderList) -> Metadata {
    headers
        .into_iter()
        .filter_map(|(name, value)| value.map(|value| (name, value)))
        .collect()
}
