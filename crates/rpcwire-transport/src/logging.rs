//! Structured logging for transport calls.
//!
//! A [`Logger`] wraps a parent [`tracing::Span`]. Each RPC call derives a
//! child span `rpc_call{rpc, id}` from it, so every record a call emits can
//! be correlated by its random request id.
//!
//! ```rust
//! use rpcwire_transport::logging::Logger;
//!
//! let root = Logger::disabled();
//! let call = root.child("SayHello", "9f2c").with_verbose(true);
//! assert!(!call.is_enabled());
//! ```

use tracing::{Level, Span};

/// Handle used by transports to emit call-scoped records.
#[derive(Debug, Clone)]
pub struct Logger {
    span: Span,
    enabled: bool,
    level: Level,
}

impl Logger {
    /// Create a logger whose call spans are children of `span`.
    #[must_use]
    pub fn new(span: Span) -> Self {
        Self {
            span,
            enabled: true,
            level: Level::TRACE,
        }
    }

    /// A logger that records nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            span: Span::none(),
            enabled: false,
            level: Level::TRACE,
        }
    }

    /// Derive the logger for one call.
    #[must_use]
    pub fn child(&self, rpc: &str, id: &str) -> Self {
        if !self.enabled {
            return self.clone();
        }
        Self {
            span: tracing::debug_span!(parent: &self.span, "rpc_call", rpc = %rpc, id = %id),
            enabled: true,
            level: self.level,
        }
    }

    /// Emit the call's trace-level records at debug level instead.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.level = if verbose { Level::DEBUG } else { Level::TRACE };
        self
    }

    /// The span records are attached to.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Whether this logger emits anything.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Level used for routine call records.
    #[must_use]
    pub fn level(&self) -> Level {
        self.level
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(Span::current())
    }
}

/// Generate a per-call correlation id: 64 random bits as lowercase hex.
#[must_use]
pub fn generate_request_id() -> String {
    format!("{:x}", rand::random::<u64>())
}

/// Emit a routine call record at the logger's level.
macro_rules! call_log {
    ($logger:expr, $($arg:tt)+) => {{
        let logger: &$crate::logging::Logger = &$logger;
        if logger.is_enabled() {
            match logger.level() {
                ::tracing::Level::TRACE => ::tracing::trace!(parent: logger.span(), $($arg)+),
                _ => ::tracing::debug!(parent: logger.span(), $($arg)+),
            }
        }
    }};
}

/// Emit an error record on the call's span.
macro_rules! call_error {
    ($logger:expr, $($arg:tt)+) => {{
        let logger: &$crate::logging::Logger = &$logger;
        if logger.is_enabled() {
            ::tracing::error!(parent: logger.span(), $($arg)+);
        }
    }};
}

pub(crate) use call_error;
pub(crate) use call_log;
