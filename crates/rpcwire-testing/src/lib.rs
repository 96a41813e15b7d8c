//! Testing utilities for rpcwire transports.
//!
//! This crate provides mocks, fixtures, and async helpers for testing code
//! built on the rpcwire transports. It includes:
//!
//! - A scripted socket provider that records writes and replays responses
//! - A handler that records every transport callback
//! - Raw HTTP/1.1 and gRPC-Web response fixtures
//!
//! # Overview
//!
//! ## Mock Sockets
//!
//! ```rust
//! use std::sync::Arc;
//! use rpcwire_testing::{MockSocketProvider, RecordingHandler};
//! use rpcwire_transport::{Environment, TransportConfig};
//!
//! let provider = MockSocketProvider::new().with_auto_connect(true);
//! let config = TransportConfig::new()
//!     .with_environment(Environment::Native)
//!     .with_socket_provider(Arc::new(provider.clone()));
//!
//! let (handler, log) = RecordingHandler::new();
//! assert!(log.events().is_empty());
//! ```
//!
//! ## Fixtures
//!
//! ```rust
//! use rpcwire_testing::fixtures;
//!
//! let response = [fixtures::chunked_head(), fixtures::chunk(b"abc"), fixtures::last_chunk()];
//! assert_eq!(&response[2][..], b"0\r\n\r\n");
//! ```

#![deny(missing_docs)]

pub mod async_helpers;
pub mod fixtures;
pub mod mock;

// Re-export commonly used types
pub use async_helpers::{DEFAULT_TIMEOUT, with_default_timeout, with_timeout};
pub use mock::{
    EventLog, MockSocket, MockSocketProvider, RecordedError, RecordingHandler, TransportEvent,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::async_helpers::{with_default_timeout, with_timeout};
    pub use crate::fixtures;
    pub use crate::mock::{EventLog, MockSocket, MockSocketProvider, RecordingHandler, TransportEvent};
}
