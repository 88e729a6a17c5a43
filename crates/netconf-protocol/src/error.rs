//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while framing, decoding or encoding messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// IO error during read/write.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed XML.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Malformed attribute in an otherwise well-formed element.
    #[error("XML attribute error: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    /// Invalid entity or character reference.
    #[error("XML escape error: {0}")]
    Escape(#[from] quick_xml::escape::EscapeError),

    /// Message body is not valid UTF-8.
    #[error("message is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Message exceeds the configured maximum size.
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Chunk header did not match `\n#<size>\n` or `\n##\n`.
    #[error("invalid chunk header: {0}")]
    InvalidChunkHeader(String),

    /// Stream ended in the middle of a message.
    #[error("incomplete message: stream closed after {received} bytes")]
    IncompleteMessage { received: usize },

    /// A frame contained no root element, or an empty body was given to
    /// the writer.
    #[error("empty message")]
    EmptyMessage,

    /// A string used as an element name is not a valid XML name.
    #[error("invalid element name: {0:?}")]
    InvalidName(String),

    /// A required child element was absent.
    #[error("missing element: {0}")]
    MissingElement(&'static str),
}
