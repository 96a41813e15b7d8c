//! RPC method descriptors.

use serde::{Deserialize, Serialize};

/// The shape of an RPC method as far as the transport is concerned.
///
/// Transports never look at message contents; the only thing they need to
/// know is whether either direction streams, because that decides between
/// fixed-length and chunked request framing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodDefinition {
    /// Fully qualified service name (e.g., `helloworld.Greeter`).
    pub service_name: String,
    /// Method name within the service (e.g., `SayHello`).
    pub method_name: String,
    /// Whether the client sends a stream of messages.
    pub request_stream: bool,
    /// Whether the server replies with a stream of messages.
    pub response_stream: bool,
}

impl MethodDefinition {
    /// Create a method definition.
    #[must_use]
    pub fn new(
        service_name: impl Into<String>,
        method_name: impl Into<String>,
        request_stream: bool,
        response_stream: bool,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            method_name: method_name.into(),
            request_stream,
            response_stream,
        }
    }

    /// A method with a single request and a single response.
    #[must_use]
    pub fn unary(service_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self::new(service_name, method_name, false, false)
    }

    /// A method with a single request and a streamed response.
    #[must_use]
    pub fn server_streaming(
        service_name: impl Into<String>,
        method_name: impl Into<String>,
    ) -> Self {
        Self::new(service_name, method_name, false, true)
    }

    /// A method with a streamed request and a single response.
    #[must_use]
    pub fn client_streaming(
        service_name: impl Into<String>,
        method_name: impl Into<String>,
    ) -> Self {
        Self::new(service_name, method_name, true, false)
    }

    /// A method streaming in both directions.
    #[must_use]
    pub fn bidi_streaming(service_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self::new(service_name, method_name, true, true)
    }

    /// Neither direction streams.
    #[must_use]
    pub const fn is_unary(&self) -> bool {
        !self.request_stream && !self.response_stream
    }

    /// The HTTP path this method is served under: `/<service>/<method>`.
    #[must_use]
    pub fn path(&self) -> String {
        format!("/{}/{}", self.service_name, self.method_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaming_shapes() {
        assert!(MethodDefinition::unary("s", "m").is_unary());
        assert!(!MethodDefinition::server_streaming("s", "m").is_unary());
        assert!(!MethodDefinition::client_streaming("s", "m").is_unary());

        let bidi = MethodDefinition::bidi_streaming("s", "m");
        assert!(bidi.request_stream && bidi.response_stream);
    }

    #[test]
    fn test_path() {
        let method = MethodDefinition::unary("pkg.Service", "Call");
        assert_eq!(method.path(), "/pkg.Service/Call");
    }
}
