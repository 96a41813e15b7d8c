//! Choosing a transport for the host environment.
//!
//! Browser hosts have no raw sockets and must use the embedder's platform
//! transport. Everywhere else the socket transport is used, or the
//! streaming-fetch transport when asked for explicitly. There is no
//! fallback between strategies.

use std::fmt;
use std::sync::Arc;

use crate::config::{SocketSettings, TransportConfig};
use crate::error::TransportError;
#[cfg(feature = "fetch")]
use crate::fetch::FetchTransport;
use crate::logging::Logger;
use crate::socket::{SocketProvider, TokioSocketProvider};
use crate::socket_transport::SocketTransport;
use crate::traits::{Transport, TransportFactory, TransportOptions};

/// The kind of host the client runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
    /// A desktop or server process with full socket access.
    Native,
    /// A mobile application.
    Mobile,
    /// A browser-like host without raw sockets.
    Browser,
}

impl Environment {
    /// Classify the compilation target.
    #[must_use]
    pub const fn detect() -> Self {
        if cfg!(target_arch = "wasm32") {
            Self::Browser
        } else if cfg!(any(target_os = "android", target_os = "ios")) {
            Self::Mobile
        } else {
            Self::Native
        }
    }

    /// Lowercase name, as used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Mobile => "mobile",
            Self::Browser => "browser",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy override for hosts with socket access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyKind {
    /// HTTP/1.1 over a raw socket.
    #[default]
    Socket,
    /// A streaming HTTP client request.
    StreamingFetch,
}

/// The strategy a [`CommonTransport`] uses for every call.
#[derive(Clone)]
pub enum TransportStrategy {
    /// Raw-socket HTTP/1.1.
    Socket {
        /// Opens the connections.
        provider: Arc<dyn SocketProvider>,
        /// Socket options for every call.
        settings: SocketSettings,
    },
    /// Streaming `reqwest` requests.
    #[cfg(feature = "fetch")]
    StreamingFetch(reqwest::Client),
    /// The embedder's own transport.
    Platform(Arc<dyn TransportFactory>),
}

impl fmt::Debug for TransportStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Socket { provider, settings } => f
                .debug_struct("Socket")
                .field("provider", provider)
                .field("settings", settings)
                .finish(),
            #[cfg(feature = "fetch")]
            Self::StreamingFetch(_) => f.write_str("StreamingFetch"),
            Self::Platform(_) => f.write_str("Platform"),
        }
    }
}

/// Decide which strategy `config` calls for.
pub fn select_strategy(config: &TransportConfig) -> Result<TransportStrategy, TransportError> {
    let environment = match config.environment {
        Some(environment) => environment,
        None => {
            let environment = Environment::detect();
            if config.logger.is_enabled() {
                tracing::debug!(parent: config.logger.span(), %environment, "detected environment");
            }
            environment
        }
    };

    if environment == Environment::Browser {
        return config
            .platform
            .clone()
            .map(TransportStrategy::Platform)
            .ok_or_else(|| {
                TransportError::unsupported("browser hosts require a platform transport factory")
            });
    }

    match config.strategy.unwrap_or_default() {
        StrategyKind::Socket => Ok(TransportStrategy::Socket {
            provider: socket_provider(config),
            settings: config.socket_settings(),
        }),
        StrategyKind::StreamingFetch => fetch_strategy(config),
    }
}

fn socket_provider(config: &TransportConfig) -> Arc<dyn SocketProvider> {
    match &config.socket_provider {
        Some(provider) => Arc::clone(provider),
        None => Arc::new(TokioSocketProvider::new()),
    }
}

#[cfg(feature = "fetch")]
fn fetch_strategy(config: &TransportConfig) -> Result<TransportStrategy, TransportError> {
    Ok(TransportStrategy::StreamingFetch(
        config.http_client.clone().unwrap_or_default(),
    ))
}

#[cfg(not(feature = "fetch"))]
fn fetch_strategy(_config: &TransportConfig) -> Result<TransportStrategy, TransportError> {
    Err(TransportError::unsupported(
        "the streaming-fetch strategy requires the `fetch` feature",
    ))
}

/// Builds one transport per call with a fixed strategy.
#[derive(Debug, Clone)]
pub struct CommonTransport {
    strategy: TransportStrategy,
    logger: Logger,
}

impl CommonTransport {
    /// Create a factory for `strategy`.
    #[must_use]
    pub fn new(strategy: TransportStrategy, logger: Logger) -> Self {
        Self { strategy, logger }
    }

    /// The strategy in use.
    #[must_use]
    pub fn strategy(&self) -> &TransportStrategy {
        &self.strategy
    }
}

impl TransportFactory for CommonTransport {
    fn make_transport(&self, options: TransportOptions) -> Box<dyn Transport> {
        match &self.strategy {
            TransportStrategy::Socket { provider, settings } => Box::new(SocketTransport::new(
                options,
                Arc::clone(provider),
                *settings,
                &self.logger,
            )),
            #[cfg(feature = "fetch")]
            TransportStrategy::StreamingFetch(client) => {
                Box::new(FetchTransport::new(options, client.clone(), &self.logger))
            }
            TransportStrategy::Platform(factory) => factory.make_transport(options),
        }
    }
}

/// Build the transport factory for this host.
///
/// In browser hosts the configured platform factory is returned as is.
pub fn common_transport(
    config: TransportConfig,
) -> Result<Arc<dyn TransportFactory>, TransportError> {
    match select_strategy(&config)? {
        TransportStrategy::Platform(factory) => Ok(factory),
        strategy => Ok(Arc::new(CommonTransport::new(strategy, config.logger))),
    }
}
