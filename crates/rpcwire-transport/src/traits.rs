//! The contract between an RPC client and its transports.
//!
//! An RPC client builds one [`Transport`] per call through a
//! [`TransportFactory`], drives it with `start` / `send_message` /
//! `finish_send`, and hears back through the [`TransportHandler`] it supplied.
//!
//! # Overview
//!
//! - [`Transport`]: one call's outbound side
//! - [`TransportHandler`]: one call's inbound side
//! - [`TransportFactory`]: builds a transport per call
//!
//! # Example
//!
//! ```rust
//! use rpcwire_core::{Metadata, MethodDefinition};
//! use rpcwire_transport::{TransportCallbacks, TransportOptions};
//!
//! let handler = TransportCallbacks::new()
//!     .on_headers(|metadata: Metadata, status| println!("{status}: {metadata:?}"))
//!     .on_chunk(|chunk| println!("{} bytes", chunk.len()))
//!     .on_end(|error| println!("finished: {error:?}"));
//!
//! let options = TransportOptions::new(
//!     "http://localhost:8080/echo.Echo/Stream",
//!     MethodDefinition::server_streaming("echo.Echo", "Stream"),
//!     handler,
//! )
//! .with_debug(true);
//! assert!(options.debug);
//! ```

use std::fmt;

use bytes::Bytes;
use rpcwire_core::{Metadata, MethodDefinition};

use crate::error::TransportError;

/// Receives the response side of one call.
///
/// `on_headers` is called at most once and before any chunk. `on_end` is
/// called exactly once, last.
pub trait TransportHandler: Send {
    /// Response headers arrived.
    fn on_headers(&mut self, metadata: Metadata, status: u16);

    /// A run of response body bytes arrived.
    fn on_chunk(&mut self, chunk: Bytes);

    /// The call is over. `None` means it completed normally.
    fn on_end(&mut self, error: Option<TransportError>);
}

/// The request side of one call.
pub trait Transport: Send {
    /// Send request headers and open the exchange.
    fn start(&mut self, metadata: Metadata) -> Result<(), TransportError>;

    /// Send one framed message.
    fn send_message(&mut self, message: Bytes) -> Result<(), TransportError>;

    /// Signal that no more messages follow.
    fn finish_send(&mut self) -> Result<(), TransportError>;

    /// Abort the call. Safe at any point, any number of times.
    ///
    /// Once this returns, no further `on_headers` or `on_chunk` callback is
    /// delivered. If one is running on another thread, this blocks the
    /// calling thread until it returns, so handler callbacks should stay
    /// short and must not wait on the cancelling task. Calling `cancel` from
    /// inside a callback does not block.
    fn cancel(&mut self);
}

/// Per-call construction parameters.
pub struct TransportOptions {
    /// Full request URL, including the method path.
    pub url: String,
    /// The method being called.
    pub method_definition: MethodDefinition,
    /// Emit the call's trace records at debug level.
    pub debug: bool,
    /// Receiver for the response.
    pub handler: Box<dyn TransportHandler>,
}

impl TransportOptions {
    /// Create options for a call.
    pub fn new(
        url: impl Into<String>,
        method_definition: MethodDefinition,
        handler: impl TransportHandler + 'static,
    ) -> Self {
        Self {
            url: url.into(),
            method_definition,
            debug: false,
            handler: Box::new(handler),
        }
    }

    /// Enable verbose logging for this call.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

impl fmt::Debug for TransportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportOptions")
            .field("url", &self.url)
            .field("method_definition", &self.method_definition)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

/// Builds one transport per call.
pub trait TransportFactory: Send + Sync {
    /// Create the transport for a call.
    fn make_transport(&self, options: TransportOptions) -> Box<dyn Transport>;
}

impl<F> TransportFactory for F
where
    F: Fn(TransportOptions) -> Box<dyn Transport> + Send + Sync,
{
    fn make_transport(&self, options: TransportOptions) -> Box<dyn Transport> {
        self(options)
    }
}

type HeadersCallback = Box<dyn FnMut(Metadata, u16) + Send>;
type ChunkCallback = Box<dyn FnMut(Bytes) + Send>;
type EndCallback = Box<dyn FnMut(Option<TransportError>) + Send>;

/// A [`TransportHandler`] assembled from closures.
#[derive(Default)]
pub struct TransportCallbacks {
    on_headers: Option<HeadersCallback>,
    on_chunk: Option<ChunkCallback>,
    on_end: Option<EndCallback>,
}

impl TransportCallbacks {
    /// Callbacks that ignore everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to response headers.
    pub fn on_headers(mut self, f: impl FnMut(Metadata, u16) + Send + 'static) -> Self {
        self.on_headers = Some(Box::new(f));
        self
    }

    /// Subscribe to body chunks.
    pub fn on_chunk(mut self, f: impl FnMut(Bytes) + Send + 'static) -> Self {
        self.on_chunk = Some(Box::new(f));
        self
    }

    /// Subscribe to the end of the call.
    pub fn on_end(mut self, f: impl FnMut(Option<TransportError>) + Send + 'static) -> Self {
        self.on_end = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for TransportCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportCallbacks")
            .field("on_headers", &self.on_headers.is_some())
            .field("on_chunk", &self.on_chunk.is_some())
            .field("on_end", &self.on_end.is_some())
            .finish()
    }
}

impl TransportHandler for TransportCallbacks {
    fn on_headers(&mut self, metadata: Metadata, status: u16) {
        if let Some(f) = &mut self.on_headers {
            f(metadata, status);
        }
    }

    fn on_chunk(&mut self, chunk: Bytes) {
        if let Some(f) = &mut self.on_chunk {
            f(chunk);
        }
    }

    fn on_end(&mut self, error: Option<TransportError>) {
        if let Some(f) = &mut self.on_end {
            f(error);
        }
    }
}
