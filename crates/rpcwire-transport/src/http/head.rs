//! Request head and body framing.
//!
//! [`RequestWriter`] is sans-io: it turns header and body writes into the
//! byte segments that go on the wire, in order, and leaves delivering them
//! to the connection state machine.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::TransportError;

const CRLF: &str = "\r\n";
const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// How the request body is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// No body byte or `Content-Length` seen yet.
    Undecided,
    /// The caller declared `Content-Length`; body bytes go out raw.
    FixedLength,
    /// Body bytes go out as chunked transfer-encoding frames.
    Chunked,
}

/// Builds the outbound byte sequence for one request.
#[derive(Debug)]
pub(crate) struct RequestWriter {
    lines: Vec<String>,
    init_sent: bool,
    framing: Framing,
    finished: bool,
}

impl RequestWriter {
    pub(crate) fn new(method: &str, path: &str, host: &str) -> Self {
        Self {
            lines: vec![format!("{method} {path} HTTP/1.1"), format!("Host: {host}")],
            init_sent: false,
            framing: Framing::Undecided,
            finished: false,
        }
    }

    pub(crate) fn framing(&self) -> Framing {
        self.framing
    }

    pub(crate) fn init_sent(&self) -> bool {
        self.init_sent
    }

    /// Append a header line to the pending head.
    pub(crate) fn write_header(&mut self, name: &str, value: &str) -> Result<(), TransportError> {
        if self.init_sent {
            return Err(TransportError::HeaderAfterInit {
                name: name.to_string(),
            });
        }
        validate_header(name, value)?;

        if name.eq_ignore_ascii_case("content-length") {
            self.framing = Framing::FixedLength;
        }
        self.lines.push(format!("{name}: {value}"));
        Ok(())
    }

    /// Segments for one body write: the head (first time only), then the
    /// framed bytes.
    pub(crate) fn write(&mut self, data: &[u8]) -> Vec<Bytes> {
        if self.framing == Framing::Undecided {
            self.framing = Framing::Chunked;
            self.lines.push("Transfer-Encoding: chunked".to_string());
        }

        let mut segments = Vec::with_capacity(2);
        if let Some(head) = self.take_head() {
            segments.push(head);
        }

        match self.framing {
            Framing::Chunked if data.is_empty() => {}
            Framing::Chunked => segments.push(encode_chunk(data)),
            _ if data.is_empty() => {}
            _ => segments.push(Bytes::copy_from_slice(data)),
        }
        segments
    }

    /// Segments that terminate the body.
    ///
    /// Chunked (or still undecided) bodies get the last-chunk marker, once.
    /// Fixed-length bodies need nothing.
    pub(crate) fn finish(&mut self) -> Vec<Bytes> {
        if self.framing == Framing::FixedLength {
            return self.take_head().into_iter().collect();
        }
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut segments = self.write(&[]);
        segments.push(Bytes::from_static(LAST_CHUNK));
        segments
    }

    fn take_head(&mut self) -> Option<Bytes> {
        if self.init_sent {
            return None;
        }
        self.init_sent = true;

        let mut head = self.lines.join(CRLF);
        head.push_str(CRLF);
        head.push_str(CRLF);
        Some(Bytes::from(head))
    }
}

fn encode_chunk(data: &[u8]) -> Bytes {
    let prefix = format!("{:x}{CRLF}", data.len());
    let mut frame = BytesMut::with_capacity(prefix.len() + data.len() + CRLF.len());
    frame.put_slice(prefix.as_bytes());
    frame.put_slice(data);
    frame.put_slice(CRLF.as_bytes());
    frame.freeze()
}

pub(crate) fn validate_header(name: &str, value: &str) -> Result<(), TransportError> {
    let invalid = |reason| TransportError::InvalidHeader {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("empty name"));
    }
    if !name.bytes().all(is_token_byte) {
        return Err(invalid("name is not an HTTP token"));
    }
    if value.bytes().any(|b| b == b'\r' || b == b'\n' || b == 0) {
        return Err(invalid("value contains a line break"));
    }
    Ok(())
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}
