//! Transports for streaming RPC clients.
//!
//! This crate carries one RPC call per HTTP/1.1 request. It provides a
//! raw-socket transport with its own request writer and response parser,
//! a streaming-fetch transport on top of `reqwest`, and the selector that
//! picks one of them for the host environment.
//!
//! # Overview
//!
//! The transport layer is responsible for:
//!
//! - Framing request bodies (`Content-Length` for unary calls, chunked otherwise)
//! - Parsing streamed responses and handing body bytes over as they arrive
//! - Managing connection lifecycle and cancellation
//!
//! # Available Transports
//!
//! | Transport | Use Case | Feature Flag |
//! |-----------|----------|--------------|
//! | [`socket_transport::SocketTransport`] | HTTP/1.1 over TCP or TLS sockets | Always available (TLS needs `tls`) |
//! | `fetch::FetchTransport` | Streaming `reqwest` requests | `fetch` |
//! | Platform factory | Browser hosts, supplied by the embedder | Always available |
//!
//! # Example
//!
//! ```no_run
//! use rpcwire_core::{Metadata, MethodDefinition};
//! use rpcwire_transport::{TransportCallbacks, TransportConfig, TransportOptions, common_transport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), rpcwire_transport::TransportError> {
//!     let factory = common_transport(TransportConfig::new())?;
//!
//!     let handler = TransportCallbacks::new()
//!         .on_headers(|_, status| println!("status {status}"))
//!         .on_chunk(|chunk| println!("{} bytes", chunk.len()))
//!         .on_end(|error| println!("done: {error:?}"));
//!
//!     let mut transport = factory.make_transport(TransportOptions::new(
//!         "http://localhost:8080/helloworld.Greeter/SayHello",
//!         MethodDefinition::unary("helloworld.Greeter", "SayHello"),
//!         handler,
//!     ));
//!
//!     let mut metadata = Metadata::new();
//!     metadata.append("content-type", "application/grpc-web+proto");
//!     transport.start(metadata)?;
//!     transport.send_message(vec![0, 0, 0, 0, 0].into())?;
//!     transport.finish_send()?;
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod runtime;
pub mod selector;
pub mod socket;
pub mod socket_transport;
pub mod traits;

#[cfg(feature = "fetch")]
pub mod fetch;

mod gate;

// Re-export commonly used types
pub use error::TransportError;
pub use traits::{
    Transport, TransportCallbacks, TransportFactory, TransportHandler, TransportOptions,
};

pub use config::{SocketSettings, TransportConfig};
pub use logging::Logger;
pub use selector::{
    CommonTransport, Environment, StrategyKind, TransportStrategy, common_transport,
    select_strategy,
};
pub use socket::{ConnectFailure, SocketProvider, TokioSocketProvider};
pub use socket_transport::{CallState, SocketTransport};

#[cfg(feature = "fetch")]
pub use fetch::FetchTransport;

pub use bytes::Bytes;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::TransportConfig;
    pub use crate::error::TransportError;
    pub use crate::logging::Logger;
    pub use crate::selector::{Environment, StrategyKind, common_transport};
    pub use crate::traits::{
        Transport, TransportCallbacks, TransportFactory, TransportHandler, TransportOptions,
    };
}
