//! Envelope types exchanged over a NETCONF session.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use netconf_core::NOTIFICATION_NS;
use quick_xml::escape::escape;
use serde::Serialize;

use crate::error::{ProtocolError, ProtocolResult};

/// Whether `name` is an XML name with no `:`.
fn is_ncname(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// A namespace-qualified XML element name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct QualifiedName {
    /// Namespace URI, empty when the element is unqualified.
    pub namespace: String,
    /// Local part of the name.
    pub local: String,
}

impl QualifiedName {
    /// Creates a qualified name.
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.local)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local)
        }
    }
}

/// The body of an RPC call, as serialized XML placed inside `<rpc>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request(String);

impl Request {
    /// Wraps an already serialized operation.
    pub fn new(xml: impl Into<String>) -> Self {
        Self(xml.into())
    }

    /// Returns the serialized operation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<get-config>` on the named datastore (`running`, `candidate`, `startup`).
    ///
    /// The datastore becomes an element name, so it must be an XML name
    /// without a prefix.
    pub fn get_config(source: &str) -> ProtocolResult<Self> {
        if !is_ncname(source) {
            return Err(ProtocolError::InvalidName(source.to_string()));
        }
        Ok(Self(format!(
            "<get-config><source><{source}/></source></get-config>"
        )))
    }

    /// `<get>`, optionally restricted by a subtree filter.
    pub fn get(filter: Option<&str>) -> Self {
        match filter {
            Some(filter) => Self(format!(
                "<get><filter type=\"subtree\">{filter}</filter></get>"
            )),
            None => Self("<get/>".to_string()),
        }
    }

    /// RFC 5277 `<create-subscription>`, optionally for a named stream.
    pub fn create_subscription(stream: Option<&str>) -> Self {
        match stream {
            Some(stream) => Self(format!(
                "<create-subscription xmlns=\"{NOTIFICATION_NS}\"><stream>{}</stream></create-subscription>",
                escape(stream)
            )),
            None => Self(format!("<create-subscription xmlns=\"{NOTIFICATION_NS}\"/>")),
        }
    }

    /// `<close-session>`.
    pub fn close_session() -> Self {
        Self("<close-session/>".to_string())
    }
}

impl From<&str> for Request {
    fn from(xml: &str) -> Self {
        Self::new(xml)
    }
}

impl From<String> for Request {
    fn from(xml: String) -> Self {
        Self(xml)
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capability announcement, exchanged once in each direction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HelloMessage {
    /// Announced capability URIs.
    pub capabilities: Vec<String>,
    /// Session id assigned by the server. Clients never send one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<u64>,
}

impl HelloMessage {
    /// Creates a client hello.
    pub fn new(capabilities: Vec<String>) -> Self {
        Self {
            capabilities,
            session_id: None,
        }
    }

    /// Whether `capability` was announced.
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

/// One outbound `<rpc>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcMessage {
    /// Value of the `message-id` attribute.
    pub message_id: String,
    /// Operation placed inside the element, verbatim.
    pub payload: Request,
}

impl RpcMessage {
    /// Creates an RPC envelope.
    pub fn new(message_id: impl Into<String>, payload: Request) -> Self {
        Self {
            message_id: message_id.into(),
            payload,
        }
    }
}

/// An `<rpc-error>` carried in a reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RpcError {
    /// `transport`, `rpc`, `protocol` or `application`.
    pub error_type: String,
    /// Error tag such as `invalid-value`.
    pub tag: String,
    /// `error` or `warning`.
    pub severity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Raw XML content of `<error-info>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.severity, self.tag, self.error_type)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

/// A decoded `<rpc-reply>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RpcReply {
    /// The `message-id` attribute echoed by the server, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Whether the reply contained `<ok/>`.
    pub ok: bool,
    /// Errors and warnings reported by the server.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RpcError>,
    /// Inner XML of the `<rpc-reply>` element.
    pub data: String,
    /// The whole `<rpc-reply>` element as received.
    pub raw: String,
}

impl RpcReply {
    /// Whether any reported error has severity `error`.
    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(|e| e.severity == "error")
    }
}

/// A decoded `<notification>` as it appears on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationMessage {
    /// Text of `<eventTime>`.
    pub event_time: String,
    /// Name of the event element.
    pub event_name: QualifiedName,
    /// Inner XML of the event element.
    pub event_body: String,
}

impl NotificationMessage {
    /// Builds the subscriber-facing notification, re-wrapping the event body
    /// in an element carrying the original name and namespace.
    pub fn into_notification(self) -> Notification {
        let event = format!(
            r#"<{local} xmlns="{ns}">{body}</{local}>"#,
            local = self.event_name.local,
            ns = escape(self.event_name.namespace.as_str()),
            body = self.event_body,
        );
        Notification {
            name: self.event_name,
            event_time: self.event_time,
            event,
        }
    }
}

/// An asynchronous event delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Name of the event element.
    pub name: QualifiedName,
    /// Event timestamp as sent by the server.
    pub event_time: String,
    /// The event element, re-serialized with its namespace.
    pub event: String,
}

impl Notification {
    /// Parses `event_time` as an RFC 3339 timestamp.
    pub fn event_time_parsed(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(self.event_time.trim()).ok()
    }
}

/// A top-level inbound element, classified by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// `<hello>` in the base namespace.
    Hello(HelloMessage),
    /// `<rpc-reply>` in the base namespace.
    RpcReply(RpcReply),
    /// `<notification>` in the notification namespace.
    Notification(NotificationMessage),
    /// Any other root element.
    Unexpected(QualifiedName),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_name_display() {
        assert_eq!(QualifiedName::new("", "data").to_string(), "data");
        assert_eq!(
            QualifiedName::new("urn:x", "event").to_string(),
            "{urn:x}event"
        );
    }

    #[test]
    fn request_builders() {
        assert_eq!(
            Request::get_config("running").unwrap().as_str(),
            "<get-config><source><running/></source></get-config>"
        );
        assert_eq!(Request::get(None).as_str(), "<get/>");
        assert_eq!(
            Request::get(Some("<interfaces/>")).as_str(),
            r#"<get><filter type="subtree"><interfaces/></filter></get>"#
        );
        assert_eq!(
            Request::create_subscription(Some("NETCONF")).as_str(),
            r#"<create-subscription xmlns="urn:ietf:params:xml:ns:netconf:notification:1.0"><stream>NETCONF</stream></create-subscription>"#
        );
        assert_eq!(Request::from("<lock/>").to_string(), "<lock/>");
    }

    #[test]
    fn get_config_rejects_bad_datastore_names() {
        assert!(Request::get_config("candidate").is_ok());
        assert!(Request::get_config("my_store-2.v1").is_ok());
        for name in ["", "2nd", "a b", "ex:running", "run/>", "a&b", "-x"] {
            assert!(
                matches!(Request::get_config(name), Err(ProtocolError::InvalidName(ref n)) if n == name),
                "{name:?} accepted"
            );
        }
    }

    #[test]
    fn notification_rewraps_event() {
        let message = NotificationMessage {
            event_time: "2024-01-02T03:04:05Z".to_string(),
            event_name: QualifiedName::new("urn:example:events", "link-down"),
            event_body: "<if>eth0</if>".to_string(),
        };
        let n = message.into_notification();
        assert_eq!(
            n.event,
            r#"<link-down xmlns="urn:example:events"><if>eth0</if></link-down>"#
        );
        assert_eq!(n.name.local, "link-down");
        assert!(n.event_time_parsed().is_some());
    }

    #[test]
    fn bad_event_time_is_none() {
        let n = NotificationMessage {
            event_time: "yesterday".to_string(),
            ..Default::default()
        }
        .into_notification();
        assert!(n.event_time_parsed().is_none());
    }

    #[test]
    fn reply_error_severity() {
        let mut reply = RpcReply::default();
        assert!(!reply.has_errors());

        reply.errors.push(RpcError {
            severity: "warning".to_string(),
            ..Default::default()
        });
        assert!(!reply.has_errors());

        reply.errors.push(RpcError {
            error_type: "application".to_string(),
            tag: "invalid-value".to_string(),
            severity: "error".to_string(),
            message: Some("bad mtu".to_string()),
            ..Default::default()
        });
        assert!(reply.has_errors());
        assert_eq!(
            reply.errors[1].to_string(),
            "error invalid-value (application): bad mtu"
        );
    }

    #[test]
    fn notification_serializes() {
        let n = Notification {
            name: QualifiedName::new("urn:x", "tick"),
            event_time: "2024-01-01T00:00:00Z".to_string(),
            event: r#"<tick xmlns="urn:x"></tick>"#.to_string(),
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["name"]["local"], "tick");
        assert_eq!(json["event_time"], "2024-01-01T00:00:00Z");
    }
}
