//! Capability URIs and hello negotiation.

/// Base protocol, version 1.0 (end-of-message framing).
pub const BASE_1_0: &str = "urn:ietf:params:netconf:base:1.0";

/// Base protocol, version 1.1 (chunked framing, RFC 6242).
pub const BASE_1_1: &str = "urn:ietf:params:netconf:base:1.1";

/// Namespace of `<hello>`, `<rpc>` and `<rpc-reply>`.
pub const NETCONF_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

/// Namespace of `<notification>` (RFC 5277).
pub const NOTIFICATION_NS: &str = "urn:ietf:params:xml:ns:netconf:notification:1.0";

/// Capabilities a client announces when nothing else is configured.
pub fn default_capabilities() -> Vec<String> {
    vec![BASE_1_0.to_string()]
}

/// Outcome of comparing the server hello against the local capability set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    /// Capabilities to send back in the client hello.
    pub capabilities: Vec<String>,
    /// Whether both directions switch to chunked framing after the hello exchange.
    pub chunked_framing: bool,
}

/// Computes the client hello for a given server hello.
///
/// A server offering base:1.1 gets exactly `[base:1.1]` back and the session
/// moves to chunked framing. Anything else gets the local set unchanged and
/// keeps end-of-message framing.
pub fn negotiate<S: AsRef<str>>(server: &[S], local: &[String]) -> Negotiated {
    if server.iter().any(|c| c.as_ref() == BASE_1_1) {
        Negotiated {
            capabilities: vec![BASE_1_1.to_string()],
            chunked_framing: true,
        }
    } else {
        Negotiated {
            capabilities: local.to_vec(),
            chunked_framing: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_with_base11_gets_only_base11() {
        let server = [BASE_1_0, BASE_1_1, "urn:ietf:params:netconf:capability:notification:1.0"];
        let result = negotiate(&server, &default_capabilities());
        assert_eq!(result.capabilities, vec![BASE_1_1.to_string()]);
        assert!(result.chunked_framing);
    }

    #[test]
    fn server_without_base11_keeps_local_set() {
        let local = vec![
            BASE_1_0.to_string(),
            "urn:ietf:params:netconf:capability:startup:1.0".to_string(),
        ];
        let result = negotiate(&[BASE_1_0], &local);
        assert_eq!(result.capabilities, local);
        assert!(!result.chunked_framing);
    }

    #[test]
    fn empty_server_hello() {
        let server: [&str; 0] = [];
        let result = negotiate(&server, &default_capabilities());
        assert_eq!(result.capabilities, vec![BASE_1_0.to_string()]);
        assert!(!result.chunked_framing);
    }
}
