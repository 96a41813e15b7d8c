//! # rpcwire - streaming RPC transports
//!
//! Transports that carry one streaming RPC call (gRPC-Web style) per
//! HTTP/1.1 request, with the response body handed over chunk by chunk as it
//! arrives.
//!
//! ## Features
//!
//! - **Raw-socket HTTP/1.1** with its own request framing and incremental
//!   response parsing, over TCP or TLS
//! - **Streaming fetch** on top of `reqwest` as an opt-in alternative
//! - **Environment-aware selection** with an escape hatch for browser hosts
//! - **Cancellation at any point**, with no callback observed afterwards
//!
//! ## Quick Start
//!
//! ```no_run
//! use rpcwire::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), TransportError> {
//!     let factory = common_transport(TransportConfig::new())?;
//!
//!     let mut transport = factory.make_transport(TransportOptions::new(
//!         "http://localhost:8080/echo.Echo/Stream",
//!         MethodDefinition::bidi_streaming("echo.Echo", "Stream"),
//!         TransportCallbacks::new().on_chunk(|chunk| println!("{} bytes", chunk.len())),
//!     ));
//!
//!     transport.start(Metadata::new())?;
//!     transport.send_message(Bytes::from_static(b"\x00\x00\x00\x00\x00"))?;
//!     transport.finish_send()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Crate Organization
//!
//! - [`rpcwire_core`] - Metadata, method definitions, error classification (no async runtime)
//! - [`rpcwire_transport`] - The HTTP client, the transports and the selector

#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::unwrap_used)]
#![allow(clippy::module_name_repetitions)]

pub mod prelude;

// Re-export all public items from core
pub use rpcwire_core::*;

// Re-export transport types
pub use rpcwire_transport::{
    Bytes, CallState, CommonTransport, Environment, Logger, SocketSettings, SocketTransport,
    StrategyKind, Transport, TransportCallbacks, TransportConfig, TransportError,
    TransportFactory, TransportHandler, TransportOptions, TransportStrategy, common_transport,
};

#[cfg(feature = "fetch")]
pub use rpcwire_transport::FetchTransport;

/// The transport crate, for the lower-level HTTP client and socket types.
pub use rpcwire_transport as transport;
