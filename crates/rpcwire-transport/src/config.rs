//! Transport selection and socket configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::logging::Logger;
use crate::selector::{Environment, StrategyKind};
use crate::socket::SocketProvider;
use crate::traits::TransportFactory;

/// Default connection establishment timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Socket options applied to every call of a socket-based transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketSettings {
    /// Disable Nagle's algorithm.
    pub no_delay: bool,
    /// Upper bound on connection establishment.
    pub connect_timeout: Option<Duration>,
}

impl Default for SocketSettings {
    fn default() -> Self {
        Self {
            no_delay: true,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
        }
    }
}

/// Configuration for [`common_transport`](crate::selector::common_transport).
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use rpcwire_transport::{Environment, StrategyKind, TransportConfig};
///
/// let config = TransportConfig::new()
///     .with_environment(Environment::Native)
///     .with_strategy(StrategyKind::Socket)
///     .with_connect_timeout(Some(Duration::from_secs(3)))
///     .with_no_delay(false);
///
/// assert_eq!(config.connect_timeout, Some(Duration::from_secs(3)));
/// assert!(!config.no_delay);
/// ```
#[derive(Clone)]
pub struct TransportConfig {
    /// Host environment; detected when unset.
    pub environment: Option<Environment>,
    /// Strategy override for native and mobile hosts.
    pub strategy: Option<StrategyKind>,
    /// Parent for every call's log span.
    pub logger: Logger,
    /// Upper bound on connection establishment.
    pub connect_timeout: Option<Duration>,
    /// Disable Nagle's algorithm.
    pub no_delay: bool,
    /// Socket provider to use instead of the built-in one.
    pub socket_provider: Option<Arc<dyn SocketProvider>>,
    /// Transport factory used in browser hosts.
    pub platform: Option<Arc<dyn TransportFactory>>,
    /// HTTP client for the streaming-fetch strategy.
    #[cfg(feature = "fetch")]
    pub http_client: Option<reqwest::Client>,
}

impl TransportConfig {
    /// Create a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            environment: None,
            strategy: None,
            logger: Logger::default(),
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            no_delay: true,
            socket_provider: None,
            platform: None,
            #[cfg(feature = "fetch")]
            http_client: None,
        }
    }

    /// Skip detection and assume this environment.
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Choose the strategy for native and mobile hosts.
    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Set the parent logger.
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Set the connect timeout. `None` waits as long as the OS does.
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the no-delay flag.
    pub fn with_no_delay(mut self, no_delay: bool) -> Self {
        self.no_delay = no_delay;
        self
    }

    /// Inject a socket provider.
    pub fn with_socket_provider(mut self, provider: Arc<dyn SocketProvider>) -> Self {
        self.socket_provider = Some(provider);
        self
    }

    /// Set the transport factory for browser hosts.
    pub fn with_platform(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.platform = Some(factory);
        self
    }

    /// Use a custom HTTP client for the streaming-fetch strategy.
    #[cfg(feature = "fetch")]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Socket options derived from this configuration.
    #[must_use]
    pub fn socket_settings(&self) -> SocketSettings {
        SocketSettings {
            no_delay: self.no_delay,
            connect_timeout: self.connect_timeout,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConfig")
            .field("environment", &self.environment)
            .field("strategy", &self.strategy)
            .field("logger", &self.logger)
            .field("connect_timeout", &self.connect_timeout)
            .field("no_delay", &self.no_delay)
            .field("socket_provider", &self.socket_provider)
            .field("platform", &self.platform.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransportConfig::default();
        assert!(config.environment.is_none());
        assert!(config.strategy.is_none());
        assert!(config.no_delay);
        assert_eq!(config.connect_timeout, Some(DEFAULT_CONNECT_TIMEOUT));
        assert_eq!(config.socket_settings(), SocketSettings::default());
    }

    #[test]
    fn test_socket_settings_follow_builders() {
        let config = TransportConfig::new()
            .with_no_delay(false)
            .with_connect_timeout(None);
        assert_eq!(
            config.socket_settings(),
            SocketSettings {
                no_delay: false,
                connect_timeout: None,
            }
        );
    }
}
