//! Prelude module for convenient imports.
//!
//! Import everything you need with a single use statement:
//!
//! ```rust
//! use rpcwire::prelude::*;
//!
//! let method = MethodDefinition::unary("helloworld.Greeter", "SayHello");
//! let config = TransportConfig::new().with_environment(Environment::Native);
//! assert!(method.is_unary());
//! assert_eq!(config.environment, Some(Environment::Native));
//! ```
//!
//! ## Included Types
//!
//! ### Core Types
//! - `Metadata` and `MethodDefinition`
//! - `TransportErrorKind`
//!
//! ### Transport Types
//! - `Transport`, `TransportHandler` and `TransportFactory` traits
//! - `TransportOptions` and `TransportCallbacks`
//! - `TransportConfig`, `Environment`, `StrategyKind` and `common_transport`

pub use rpcwire_core::{Metadata, MethodDefinition, TransportErrorKind};

pub use rpcwire_transport::{
    Bytes, Environment, Logger, StrategyKind, Transport, TransportCallbacks, TransportConfig,
    TransportError, TransportFactory, TransportHandler, TransportOptions, common_transport,
};
