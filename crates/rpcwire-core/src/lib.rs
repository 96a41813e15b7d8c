//! # rpcwire-core
//!
//! Core types shared by the rpcwire transports.
//!
//! This crate provides the runtime-free building blocks that every transport
//! strategy agrees on:
//!
//! - **Metadata**: an ordered, case-insensitive multi-map of header values
//! - **Method definitions**: the streaming shape of an RPC method
//! - **Error classification**: [`TransportErrorKind`] for transport failures
//!
//! This crate does not depend on any async runtime.
//!
//! # Example
//!
//! ```rust
//! use rpcwire_core::{Metadata, MethodDefinition};
//!
//! let method = MethodDefinition::unary("helloworld.Greeter", "SayHello");
//! assert!(method.is_unary());
//! assert_eq!(method.path(), "/helloworld.Greeter/SayHello");
//!
//! let mut metadata = Metadata::new();
//! metadata.append("Content-Type", "application/grpc-web+proto");
//! metadata.append("x-trace", "a");
//! metadata.append("X-Trace", "b");
//!
//! assert_eq!(metadata.get("x-trace"), Some(&["a".to_string(), "b".to_string()][..]));
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::unwrap_used)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod metadata;
pub mod method;

pub use error::TransportErrorKind;
pub use metadata::Metadata;
pub use method::MethodDefinition;
