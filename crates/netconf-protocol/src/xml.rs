//! XML decoding and encoding of NETCONF envelopes.
//!
//! Inbound frames are classified by their root element and decoded into an
//! [`Envelope`]. Payload content is kept as raw XML; only the envelope
//! structure (capabilities, `<ok/>`, `<rpc-error>`, `<eventTime>`) is parsed.

use quick_xml::escape::unescape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::{NsReader, Reader, Writer};

use netconf_core::{NETCONF_NS, NOTIFICATION_NS};

use crate::error::{ProtocolError, ProtocolResult};
use crate::types::{
    Envelope, HelloMessage, NotificationMessage, QualifiedName, RpcError, RpcMessage, RpcReply,
};

/// Decodes one framed message.
///
/// Declarations, comments and whitespace ahead of the root element are
/// skipped. Content after the root element is ignored.
pub fn decode_envelope(frame: &[u8]) -> ProtocolResult<Envelope> {
    let text = std::str::from_utf8(frame)?;
    let mut reader = NsReader::from_str(text);

    loop {
        let before = reader.buffer_position() as usize;
        let (namespace, event) = {
            let (resolved, event) = reader.read_resolved_event()?;
            (namespace_of(&resolved), event)
        };

        let (start, inner) = match event {
            Event::Start(start) => {
                let span = reader.read_to_end(start.name())?;
                (start, &text[span.start as usize..span.end as usize])
            }
            Event::Empty(start) => (start, ""),
            Event::Eof => return Err(ProtocolError::EmptyMessage),
            _ => continue,
        };
        let raw = &text[before..reader.buffer_position() as usize];
        let name = QualifiedName::new(namespace, local_name(&start)?);

        return match (name.namespace.as_str(), name.local.as_str()) {
            (NETCONF_NS, "hello") => decode_hello(inner).map(Envelope::Hello),
            (NETCONF_NS, "rpc-reply") => {
                let message_id = attribute(&start, "message-id")?;
                decode_reply(message_id, inner, raw).map(Envelope::RpcReply)
            }
            (NOTIFICATION_NS, "notification") => {
                decode_notification(raw).map(Envelope::Notification)
            }
            _ => Ok(Envelope::Unexpected(name)),
        };
    }
}

fn decode_hello(inner: &str) -> ProtocolResult<HelloMessage> {
    let mut reader = Reader::from_str(inner);
    reader.config_mut().trim_text(true);

    let mut hello = HelloMessage::default();
    let mut leaf: Option<Vec<u8>> = None;
    loop {
        match reader.read_event()? {
            Event::Start(e) => leaf = Some(e.local_name().as_ref().to_vec()),
            Event::Text(t) => match leaf.as_deref() {
                Some(b"capability") => hello.capabilities.push(text_of(&t)?),
                Some(b"session-id") => hello.session_id = text_of(&t)?.parse().ok(),
                _ => {}
            },
            Event::End(_) => leaf = None,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(hello)
}

fn decode_reply(message_id: Option<String>, inner: &str, raw: &str) -> ProtocolResult<RpcReply> {
    let mut reply = RpcReply {
        message_id,
        data: inner.to_string(),
        raw: raw.to_string(),
        ..Default::default()
    };

    let mut reader = Reader::from_str(inner);
    reader.config_mut().trim_text(true);

    // Depth relative to the reply element: 0 for its children.
    let mut depth = 0usize;
    let mut error: Option<RpcError> = None;
    let mut leaf: Option<Vec<u8>> = None;
    loop {
        match reader.read_event()? {
            Event::Empty(e) if depth == 0 && e.local_name().as_ref() == b"ok" => reply.ok = true,
            Event::Start(e) => {
                let local = e.local_name().as_ref().to_vec();
                match (depth, local.as_slice()) {
                    (0, b"ok") => {
                        reply.ok = true;
                        reader.read_to_end(e.name())?;
                        continue;
                    }
                    (0, b"rpc-error") => error = Some(RpcError::default()),
                    (1, b"error-info") => {
                        let span = reader.read_to_end(e.name())?;
                        if let Some(error) = error.as_mut() {
                            let info = &inner[span.start as usize..span.end as usize];
                            error.info = Some(info.trim().to_string());
                        }
                        continue;
                    }
                    _ => {}
                }
                leaf = Some(local);
                depth += 1;
            }
            Event::Text(t) if depth == 2 => {
                if let (Some(error), Some(leaf)) = (error.as_mut(), leaf.as_deref()) {
                    let value = text_of(&t)?;
                    match leaf {
                        b"error-type" => error.error_type = value,
                        b"error-tag" => error.tag = value,
                        b"error-severity" => error.severity = value,
                        b"error-app-tag" => error.app_tag = Some(value),
                        b"error-path" => error.path = Some(value),
                        b"error-message" => error.message = Some(value),
                        _ => {}
                    }
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                leaf = None;
                if depth == 0
                    && let Some(error) = error.take()
                {
                    reply.errors.push(error);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(reply)
}

fn decode_notification(raw: &str) -> ProtocolResult<NotificationMessage> {
    let mut reader = NsReader::from_str(raw);
    reader.config_mut().trim_text(true);

    let mut message = NotificationMessage::default();
    let mut found_event = false;
    // Depth 1 holds the children of <notification>.
    let mut depth = 0usize;
    let mut in_event_time = false;
    loop {
        let (namespace, event) = {
            let (resolved, event) = reader.read_resolved_event()?;
            (namespace_of(&resolved), event)
        };
        match event {
            Event::Start(e) => {
                if depth == 1 {
                    if e.local_name().as_ref() == b"eventTime" {
                        in_event_time = true;
                    } else if !found_event {
                        message.event_name = QualifiedName::new(namespace, local_name(&e)?);
                        let span = reader.read_to_end(e.name())?;
                        message.event_body = raw[span.start as usize..span.end as usize].to_string();
                        found_event = true;
                        continue;
                    }
                }
                depth += 1;
            }
            Event::Empty(e)
                if depth == 1 && !found_event && e.local_name().as_ref() != b"eventTime" =>
            {
                message.event_name = QualifiedName::new(namespace, local_name(&e)?);
                found_event = true;
            }
            Event::Text(t) if in_event_time => message.event_time = text_of(&t)?,
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                in_event_time = false;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !found_event {
        return Err(ProtocolError::MissingElement("notification event"));
    }
    Ok(message)
}

fn namespace_of(resolved: &ResolveResult<'_>) -> String {
    match resolved {
        ResolveResult::Bound(Namespace(ns)) => String::from_utf8_lossy(ns).into_owned(),
        ResolveResult::Unbound => String::new(),
        ResolveResult::Unknown(prefix) => String::from_utf8_lossy(prefix).into_owned(),
    }
}

fn local_name(start: &BytesStart<'_>) -> ProtocolResult<String> {
    Ok(std::str::from_utf8(start.local_name().as_ref())?.to_string())
}

fn text_of(text: &BytesText<'_>) -> ProtocolResult<String> {
    let raw = std::str::from_utf8(text)?;
    Ok(unescape(raw)?.into_owned())
}

fn attribute(start: &BytesStart<'_>, name: &str) -> ProtocolResult<Option<String>> {
    for attr in start.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == name.as_bytes() {
            let value = std::str::from_utf8(&attr.value)?;
            return Ok(Some(unescape(value)?.into_owned()));
        }
    }
    Ok(None)
}

impl HelloMessage {
    /// Serializes the hello, capabilities in order.
    pub fn to_xml(&self) -> ProtocolResult<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut hello = BytesStart::new("hello");
        hello.push_attribute(("xmlns", NETCONF_NS));
        writer.write_event(Event::Start(hello))?;
        writer.write_event(Event::Start(BytesStart::new("capabilities")))?;
        for capability in &self.capabilities {
            writer.write_event(Event::Start(BytesStart::new("capability")))?;
            writer.write_event(Event::Text(BytesText::new(capability)))?;
            writer.write_event(Event::End(BytesEnd::new("capability")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("capabilities")))?;
        writer.write_event(Event::End(BytesEnd::new("hello")))?;

        Ok(writer.into_inner())
    }
}

impl RpcMessage {
    /// Serializes the RPC; the payload is copied in without escaping.
    pub fn to_xml(&self) -> ProtocolResult<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut rpc = BytesStart::new("rpc");
        rpc.push_attribute(("xmlns", NETCONF_NS));
        rpc.push_attribute(("message-id", self.message_id.as_str()));
        writer.write_event(Event::Start(rpc))?;
        writer
            .get_mut()
            .extend_from_slice(self.payload.as_str().as_bytes());
        writer.write_event(Event::End(BytesEnd::new("rpc")))?;

        Ok(writer.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Request;

    const SERVER_HELLO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">
  <capabilities>
    <capability>urn:ietf:params:netconf:base:1.0</capability>
    <capability>
      urn:ietf:params:netconf:base:1.1
    </capability>
    <capability>urn:example:yang?module=ex&amp;revision=2024-01-01</capability>
  </capabilities>
  <session-id>4</session-id>
</hello>"#;

    #[test]
    fn decodes_hello() {
        let Envelope::Hello(hello) = decode_envelope(SERVER_HELLO.as_bytes()).unwrap() else {
            panic!("expected hello");
        };
        assert_eq!(
            hello.capabilities,
            vec![
                "urn:ietf:params:netconf:base:1.0",
                "urn:ietf:params:netconf:base:1.1",
                "urn:example:yang?module=ex&revision=2024-01-01",
            ]
        );
        assert_eq!(hello.session_id, Some(4));
        assert!(hello.has_capability(netconf_core::BASE_1_1));
    }

    #[test]
    fn decodes_reply_verbatim() {
        let xml = r#"<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0" message-id="101"><data/></rpc-reply>"#;
        let Envelope::RpcReply(reply) = decode_envelope(xml.as_bytes()).unwrap() else {
            panic!("expected rpc-reply");
        };
        assert_eq!(reply.message_id.as_deref(), Some("101"));
        assert_eq!(reply.data, "<data/>");
        assert_eq!(reply.raw, xml);
        assert!(!reply.ok);
        assert!(reply.errors.is_empty());
    }

    #[test]
    fn decodes_prefixed_reply_with_ok() {
        let xml = r#"
<nc:rpc-reply xmlns:nc="urn:ietf:params:xml:ns:netconf:base:1.0" nc:message-id="7">
  <nc:ok/>
</nc:rpc-reply>"#;
        let Envelope::RpcReply(reply) = decode_envelope(xml.as_bytes()).unwrap() else {
            panic!("expected rpc-reply");
        };
        assert!(reply.ok);
        assert_eq!(reply.message_id.as_deref(), Some("7"));
        assert!(reply.raw.starts_with("<nc:rpc-reply"));
        assert!(reply.raw.ends_with("</nc:rpc-reply>"));
    }

    #[test]
    fn empty_reply_element() {
        let xml = r#"<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"/>"#;
        let Envelope::RpcReply(reply) = decode_envelope(xml.as_bytes()).unwrap() else {
            panic!("expected rpc-reply");
        };
        assert_eq!(reply.data, "");
        assert_eq!(reply.raw, xml);
        assert!(reply.message_id.is_none());
    }

    #[test]
    fn decodes_rpc_errors() {
        let xml = r#"<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0" message-id="3">
  <rpc-error>
    <error-type>application</error-type>
    <error-tag>invalid-value</error-tag>
    <error-severity>error</error-severity>
    <error-path>/interfaces/interface[name='eth0']/mtu</error-path>
    <error-message xml:lang="en">MTU out of range</error-message>
    <error-info><bad-element>mtu</bad-element></error-info>
  </rpc-error>
  <rpc-error>
    <error-type>protocol</error-type>
    <error-tag>operation-failed</error-tag>
    <error-severity>warning</error-severity>
  </rpc-error>
</rpc-reply>"#;
        let Envelope::RpcReply(reply) = decode_envelope(xml.as_bytes()).unwrap() else {
            panic!("expected rpc-reply");
        };
        assert_eq!(reply.errors.len(), 2);
        let first = &reply.errors[0];
        assert_eq!(first.error_type, "application");
        assert_eq!(first.tag, "invalid-value");
        assert_eq!(first.severity, "error");
        assert_eq!(
            first.path.as_deref(),
            Some("/interfaces/interface[name='eth0']/mtu")
        );
        assert_eq!(first.message.as_deref(), Some("MTU out of range"));
        assert_eq!(first.info.as_deref(), Some("<bad-element>mtu</bad-element>"));
        assert_eq!(reply.errors[1].severity, "warning");
        assert!(reply.has_errors());
        assert!(!reply.ok);
    }

    #[test]
    fn data_elements_are_not_errors() {
        let xml = r#"<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><data><error-tag>x</error-tag><ok/></data></rpc-reply>"#;
        let Envelope::RpcReply(reply) = decode_envelope(xml.as_bytes()).unwrap() else {
            panic!("expected rpc-reply");
        };
        assert!(reply.errors.is_empty());
        assert!(!reply.ok);
    }

    #[test]
    fn decodes_notification() {
        let xml = r#"<notification xmlns="urn:ietf:params:xml:ns:netconf:notification:1.0">
  <eventTime>2024-05-01T10:00:00Z</eventTime>
  <link-down xmlns="urn:example:events"><if>eth0</if></link-down>
</notification>"#;
        let Envelope::Notification(message) = decode_envelope(xml.as_bytes()).unwrap() else {
            panic!("expected notification");
        };
        assert_eq!(message.event_time, "2024-05-01T10:00:00Z");
        assert_eq!(
            message.event_name,
            QualifiedName::new("urn:example:events", "link-down")
        );
        assert_eq!(message.event_body, "<if>eth0</if>");

        let n = message.into_notification();
        assert_eq!(
            n.event,
            r#"<link-down xmlns="urn:example:events"><if>eth0</if></link-down>"#
        );
    }

    #[test]
    fn notification_with_empty_event() {
        let xml = r#"<notification xmlns="urn:ietf:params:xml:ns:netconf:notification:1.0"><eventTime>t</eventTime><tick xmlns="urn:x"/></notification>"#;
        let Envelope::Notification(message) = decode_envelope(xml.as_bytes()).unwrap() else {
            panic!("expected notification");
        };
        assert_eq!(message.event_name, QualifiedName::new("urn:x", "tick"));
        assert_eq!(message.event_body, "");
    }

    #[test]
    fn notification_without_event() {
        let xml = r#"<notification xmlns="urn:ietf:params:xml:ns:netconf:notification:1.0"><eventTime>t</eventTime></notification>"#;
        let err = decode_envelope(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingElement(_)));
    }

    #[test]
    fn wrong_namespace_is_unexpected() {
        let envelope = decode_envelope(b"<rpc-reply><data/></rpc-reply>").unwrap();
        assert_eq!(
            envelope,
            Envelope::Unexpected(QualifiedName::new("", "rpc-reply"))
        );

        let envelope = decode_envelope(br#"<!-- hi --><foo xmlns="urn:x"/>"#).unwrap();
        assert_eq!(envelope, Envelope::Unexpected(QualifiedName::new("urn:x", "foo")));
    }

    #[test]
    fn empty_and_malformed_frames() {
        assert!(matches!(
            decode_envelope(b"  \n").unwrap_err(),
            ProtocolError::EmptyMessage
        ));
        assert!(decode_envelope(b"<rpc-reply xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\"><data>").is_err());
        assert!(matches!(
            decode_envelope(&[0xff, 0xfe]).unwrap_err(),
            ProtocolError::Utf8(_)
        ));
    }

    #[test]
    fn encodes_hello() {
        let hello = HelloMessage::new(vec![netconf_core::BASE_1_0.to_string()]);
        let xml = String::from_utf8(hello.to_xml().unwrap()).unwrap();
        insta::assert_snapshot!(xml, @r#"<?xml version="1.0" encoding="UTF-8"?><hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><capabilities><capability>urn:ietf:params:netconf:base:1.0</capability></capabilities></hello>"#);
    }

    #[test]
    fn encodes_rpc() {
        let rpc = RpcMessage::new("42", Request::new("<get-config><source><running/></source></get-config>"));
        let xml = String::from_utf8(rpc.to_xml().unwrap()).unwrap();
        insta::assert_snapshot!(xml, @r#"<?xml version="1.0" encoding="UTF-8"?><rpc xmlns="urn:ietf:params:xml:ns:netconf:base:1.0" message-id="42"><get-config><source><running/></source></get-config></rpc>"#);
    }

    #[test]
    fn encoded_hello_decodes() {
        let hello = HelloMessage::new(vec![
            netconf_core::BASE_1_1.to_string(),
            "urn:example:a&b".to_string(),
        ]);
        let bytes = hello.to_xml().unwrap();
        assert_eq!(decode_envelope(&bytes).unwrap(), Envelope::Hello(hello));
    }
}
