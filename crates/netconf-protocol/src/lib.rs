//! NETCONF message framing and envelope encoding.
//!
//! This crate covers everything between a session and its byte stream:
//!
//! - [`FrameReader`] / [`FrameWriter`]: end-of-message (`]]>]]>`) and
//!   chunked (RFC 6242) framing, switchable at runtime via [`FramingSwitch`].
//! - [`decode_envelope`]: classifies a framed message by its root element and
//!   decodes `<hello>`, `<rpc-reply>` and `<notification>` envelopes.
//! - [`HelloMessage::to_xml`] / [`RpcMessage::to_xml`]: outbound envelopes.
//!
//! Operation payloads are carried as raw XML in both directions.
//!
//! # Example
//!
//! ```rust
//! use netconf_protocol::{Envelope, decode_envelope};
//!
//! let frame = br#"<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><ok/></rpc-reply>"#;
//! let Envelope::RpcReply(reply) = decode_envelope(frame).unwrap() else { unreachable!() };
//! assert!(reply.ok);
//! ```

mod error;
mod framing;
mod types;
mod xml;

pub use error::{ProtocolError, ProtocolResult};
pub use framing::{
    DEFAULT_MAX_MESSAGE_SIZE, END_OF_MESSAGE, FrameReader, FrameWriter, FramingMode, FramingSwitch,
};
pub use types::{
    Envelope, HelloMessage, Notification, NotificationMessage, QualifiedName, Request, RpcError,
    RpcMessage, RpcReply,
};
pub use xml::decode_envelope;
