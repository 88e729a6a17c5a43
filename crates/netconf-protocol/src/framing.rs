//! Message framing for NETCONF over a byte stream.
//!
//! Two framings exist and a session starts with the first:
//!
//! ```text
//! end-of-message (base:1.0):  <xml...>]]>]]>
//! chunked (base:1.1):         \n#<size>\n<size bytes> ... \n##\n
//! ```
//!
//! The reader and writer halves of a session share a [`FramingSwitch`] which
//! is flipped to chunked once, after the hello exchange, when both peers
//! announced base:1.1.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProtocolError, ProtocolResult};

/// Delimiter terminating every message under end-of-message framing.
pub const END_OF_MESSAGE: &[u8] = b"]]>]]>";

/// Default upper bound for a single inbound message (64 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Largest chunk size allowed by RFC 6242.
const MAX_CHUNK_SIZE: u64 = 4_294_967_295;

/// The framing currently in effect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FramingMode {
    /// `]]>]]>`-delimited messages.
    #[default]
    EndOfMessage,
    /// RFC 6242 chunked framing.
    Chunked,
}

/// Shared, one-way switch from end-of-message to chunked framing.
#[derive(Debug, Clone, Default)]
pub struct FramingSwitch {
    chunked: Arc<AtomicBool>,
}

impl FramingSwitch {
    /// Creates a switch in end-of-message mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current mode.
    pub fn mode(&self) -> FramingMode {
        if self.chunked.load(Ordering::Acquire) {
            FramingMode::Chunked
        } else {
            FramingMode::EndOfMessage
        }
    }

    /// Moves every holder of this switch to chunked framing.
    pub fn set_chunked(&self) {
        self.chunked.store(true, Ordering::Release);
    }
}

/// Reads whole messages from a buffered byte stream.
pub struct FrameReader<R> {
    reader: R,
    switch: FramingSwitch,
    max_message_size: usize,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    /// Creates a reader that follows `switch`.
    pub fn new(reader: R, switch: FramingSwitch) -> Self {
        Self {
            reader,
            switch,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Builder: set the largest accepted message.
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Returns the framing the next message will be read with.
    pub fn mode(&self) -> FramingMode {
        self.switch.mode()
    }

    /// Reads the next message body, without its framing.
    ///
    /// Returns `Ok(None)` when the stream ends between two messages.
    pub async fn read_frame(&mut self) -> ProtocolResult<Option<Vec<u8>>> {
        // The mode is only sampled once the next message has started to
        // arrive, so a switch made while this call is parked still applies.
        if self.reader.fill_buf().await?.is_empty() {
            return Ok(None);
        }

        match self.switch.mode() {
            FramingMode::EndOfMessage => self.read_end_of_message().await,
            FramingMode::Chunked => self.read_chunked().await.map(Some),
        }
    }

    async fn read_end_of_message(&mut self) -> ProtocolResult<Option<Vec<u8>>> {
        let mut buf = Vec::new();
        loop {
            let n = self.reader.read_until(b'>', &mut buf).await?;
            if n == 0 {
                // Whitespace after the last delimiter is not a message.
                if buf.iter().all(u8::is_ascii_whitespace) {
                    return Ok(None);
                }
                return Err(ProtocolError::IncompleteMessage {
                    received: buf.len(),
                });
            }

            if buf.ends_with(END_OF_MESSAGE) {
                buf.truncate(buf.len() - END_OF_MESSAGE.len());
                return Ok(Some(buf));
            }

            if buf.len() > self.max_message_size {
                return Err(ProtocolError::MessageTooLarge {
                    size: buf.len(),
                    max: self.max_message_size,
                });
            }
        }
    }

    async fn read_chunked(&mut self) -> ProtocolResult<Vec<u8>> {
        let mut message = Vec::new();
        while let Some(size) = self.read_chunk_header(message.len()).await? {
            if message.len() + size > self.max_message_size {
                return Err(ProtocolError::MessageTooLarge {
                    size: message.len() + size,
                    max: self.max_message_size,
                });
            }
            let start = message.len();
            message.resize(start + size, 0);
            self.reader
                .read_exact(&mut message[start..])
                .await
                .map_err(|e| incomplete(e, start))?;
        }

        if message.is_empty() {
            return Err(ProtocolError::InvalidChunkHeader(
                "end-of-chunks before any chunk".to_string(),
            ));
        }
        Ok(message)
    }

    /// Parses `\n#<size>\n` (returns the size) or `\n##\n` (returns `None`).
    async fn read_chunk_header(&mut self, received: usize) -> ProtocolResult<Option<usize>> {
        let mut header = Vec::with_capacity(12);
        for expected in [b'\n', b'#'] {
            let byte = self.reader.read_u8().await.map_err(|e| incomplete(e, received))?;
            header.push(byte);
            if byte != expected {
                return Err(invalid_header(&header));
            }
        }

        let mut size: u64 = 0;
        let mut digits = 0;
        loop {
            let byte = self.reader.read_u8().await.map_err(|e| incomplete(e, received))?;
            header.push(byte);
            match byte {
                b'#' if digits == 0 => {
                    let lf = self.reader.read_u8().await.map_err(|e| incomplete(e, received))?;
                    header.push(lf);
                    if lf != b'\n' {
                        return Err(invalid_header(&header));
                    }
                    return Ok(None);
                }
                b'0' if digits == 0 => return Err(invalid_header(&header)),
                b'0'..=b'9' => {
                    size = size * 10 + u64::from(byte - b'0');
                    digits += 1;
                    if size > MAX_CHUNK_SIZE {
                        return Err(invalid_header(&header));
                    }
                }
                b'\n' if digits > 0 => break,
                _ => return Err(invalid_header(&header)),
            }
        }

        usize::try_from(size)
            .map(Some)
            .map_err(|_| invalid_header(&header))
    }

    /// Returns a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Unwraps this FrameReader, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

fn incomplete(err: io::Error, received: usize) -> ProtocolError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        ProtocolError::IncompleteMessage { received }
    } else {
        ProtocolError::Io(err)
    }
}

fn invalid_header(header: &[u8]) -> ProtocolError {
    ProtocolError::InvalidChunkHeader(String::from_utf8_lossy(header).escape_debug().to_string())
}

/// Writes whole messages to a byte stream.
pub struct FrameWriter<W> {
    writer: W,
    switch: FramingSwitch,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Creates a writer that follows `switch`.
    pub fn new(writer: W, switch: FramingSwitch) -> Self {
        Self { writer, switch }
    }

    /// Returns the framing the next message will be written with.
    pub fn mode(&self) -> FramingMode {
        self.switch.mode()
    }

    /// Frames `body` in the current mode, writes it and flushes.
    ///
    /// An empty body is rejected with [`ProtocolError::EmptyMessage`]; a
    /// chunked frame must carry at least one chunk.
    pub async fn write_frame(&mut self, body: &[u8]) -> ProtocolResult<()> {
        if body.is_empty() {
            return Err(ProtocolError::EmptyMessage);
        }
        match self.switch.mode() {
            FramingMode::EndOfMessage => {
                self.writer.write_all(body).await?;
                self.writer.write_all(END_OF_MESSAGE).await?;
            }
            FramingMode::Chunked => {
                let header = format!("\n#{}\n", body.len());
                self.writer.write_all(header.as_bytes()).await?;
                self.writer.write_all(body).await?;
                self.writer.write_all(b"\n##\n").await?;
            }
        }
        self.writer.flush().await?;
        Ok(())
    }

    /// Shuts down the write side of the stream.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }

    /// Returns a mutable reference to the underlying writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Unwraps this FrameWriter, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(bytes: &'static [u8]) -> FrameReader<&'static [u8]> {
        FrameReader::new(bytes, FramingSwitch::new())
    }

    fn chunked_reader(bytes: &'static [u8]) -> FrameReader<&'static [u8]> {
        let switch = FramingSwitch::new();
        switch.set_chunked();
        FrameReader::new(bytes, switch)
    }

    #[tokio::test]
    async fn end_of_message_frames() {
        let mut r = reader(b"<hello/>]]>]]>\n<rpc-reply/>]]>]]>\n");
        assert_eq!(r.read_frame().await.unwrap().unwrap(), b"<hello/>");
        assert_eq!(r.read_frame().await.unwrap().unwrap(), b"\n<rpc-reply/>");
        assert!(r.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn end_of_message_keeps_lone_brackets() {
        let mut r = reader(b"<a>]]></a>]]>]]>");
        assert_eq!(r.read_frame().await.unwrap().unwrap(), b"<a>]]></a>");
    }

    #[tokio::test]
    async fn end_of_message_truncated() {
        let mut r = reader(b"<rpc-reply><data/>");
        let err = r.read_frame().await.unwrap_err();
        assert!(matches!(err, ProtocolError::IncompleteMessage { received: 18 }));
    }

    #[tokio::test]
    async fn end_of_message_too_large() {
        let mut r = reader(b"<rpc-reply><data>0123456789</data></rpc-reply>]]>]]>")
            .with_max_message_size(16);
        let err = r.read_frame().await.unwrap_err();
        assert!(matches!(err, ProtocolError::MessageTooLarge { max: 16, .. }));
    }

    #[tokio::test]
    async fn empty_stream_is_orderly_end() {
        assert!(reader(b"").read_frame().await.unwrap().is_none());
        assert!(chunked_reader(b"").read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn chunked_frames() {
        let mut r = chunked_reader(b"\n#4\n<rpc\n#14\n message-id=1>\n##\n\n#3\nabc\n##\n");
        assert_eq!(r.read_frame().await.unwrap().unwrap(), b"<rpc message-id=1>");
        assert_eq!(r.read_frame().await.unwrap().unwrap(), b"abc");
        assert!(r.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn chunked_rejects_bad_headers() {
        for bytes in [
            &b"\n#0\n\n##\n"[..],
            &b"\n#01\na\n##\n"[..],
            &b"#3\nabc\n##\n"[..],
            &b"\n#x\n"[..],
            &b"\n##\n"[..],
            &b"\n#99999999999\n"[..],
        ] {
            let switch = FramingSwitch::new();
            switch.set_chunked();
            let mut r = FrameReader::new(bytes, switch);
            let err = r.read_frame().await.unwrap_err();
            assert!(
                matches!(err, ProtocolError::InvalidChunkHeader(_)),
                "{bytes:?} gave {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn chunked_truncated_body() {
        let mut r = chunked_reader(b"\n#10\nabc");
        let err = r.read_frame().await.unwrap_err();
        assert!(matches!(err, ProtocolError::IncompleteMessage { received: 0 }));
    }

    #[tokio::test]
    async fn chunked_too_large() {
        let mut r = chunked_reader(b"\n#8\n01234567\n#8\n01234567\n##\n").with_max_message_size(10);
        let err = r.read_frame().await.unwrap_err();
        assert!(matches!(err, ProtocolError::MessageTooLarge { size: 16, max: 10 }));
    }

    #[tokio::test]
    async fn switch_between_messages() {
        let switch = FramingSwitch::new();
        let mut r = FrameReader::new(&b"<hello/>]]>]]>\n#5\n<ok/>\n##\n"[..], switch.clone());
        assert_eq!(r.mode(), FramingMode::EndOfMessage);
        assert_eq!(r.read_frame().await.unwrap().unwrap(), b"<hello/>");

        switch.set_chunked();
        assert_eq!(r.mode(), FramingMode::Chunked);
        assert_eq!(r.read_frame().await.unwrap().unwrap(), b"<ok/>");
    }

    #[tokio::test]
    async fn writer_follows_switch() {
        let switch = FramingSwitch::new();
        let mut w = FrameWriter::new(Vec::new(), switch.clone());

        w.write_frame(b"<hello/>").await.unwrap();
        switch.set_chunked();
        assert_eq!(w.mode(), FramingMode::Chunked);
        w.write_frame(b"<rpc/>").await.unwrap();

        assert_eq!(w.into_inner(), b"<hello/>]]>]]>\n#6\n<rpc/>\n##\n");
    }

    #[tokio::test]
    async fn writer_rejects_empty_body() {
        let switch = FramingSwitch::new();
        let mut w = FrameWriter::new(Vec::new(), switch.clone());
        assert!(matches!(w.write_frame(b"").await, Err(ProtocolError::EmptyMessage)));

        switch.set_chunked();
        assert!(matches!(w.write_frame(b"").await, Err(ProtocolError::EmptyMessage)));
        assert!(w.into_inner().is_empty());
    }

    #[tokio::test]
    async fn writer_output_reads_back() {
        let switch = FramingSwitch::new();
        switch.set_chunked();
        let mut w = FrameWriter::new(Vec::new(), switch.clone());
        w.write_frame(b"<rpc message-id=\"7\"><get/></rpc>").await.unwrap();

        let bytes = w.into_inner();
        let mut r = FrameReader::new(&bytes[..], switch);
        assert_eq!(
            r.read_frame().await.unwrap().unwrap(),
            b"<rpc message-id=\"7\"><get/></rpc>"
        );
    }
}
