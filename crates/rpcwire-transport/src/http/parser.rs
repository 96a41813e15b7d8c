//! Incremental HTTP/1.1 response parser.
//!
//! Bytes are fed as they arrive with [`ResponseParser::execute`]; each call
//! returns the events the new bytes completed. The status line and headers
//! are parsed by `httparse`; body framing is decoded here so that body bytes
//! are surfaced as soon as they arrive instead of being reassembled.

use bytes::{Buf, Bytes, BytesMut};
use httparse::Status;

use crate::error::TransportError;

const MAX_HEADERS: usize = 100;
const MAX_HEAD_SIZE: usize = 64 * 1024;
const MAX_CHUNK_LINE: usize = 4 * 1024;

/// Header pairs in arrival order. A value that is not valid UTF-8 is `None`.
pub type HeaderList = Vec<(String, Option<String>)>;

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// Status code.
    pub status: u16,
    /// Reason phrase.
    pub reason: String,
    /// Headers, with repeated names joined by `, ` under the first spelling.
    pub headers: HeaderList,
}

impl ResponseHead {
    /// Value of the first header named `name`, ignoring case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .and_then(|(_, value)| value.as_deref())
    }
}

/// Something the parser recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    /// The response head is complete.
    Headers(ResponseHead),
    /// A run of body bytes, exactly as framed on the wire.
    Body(Bytes),
    /// Trailer fields after a chunked body.
    Trailers(HeaderList),
    /// The response is complete.
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Head,
    Length(u64),
    ChunkSize,
    ChunkData(u64),
    ChunkDataEnd,
    Trailers,
    UntilClose,
    Done,
}

/// Streaming decoder for one response.
#[derive(Debug)]
pub struct ResponseParser {
    buf: BytesMut,
    state: State,
}

impl ResponseParser {
    /// Create a parser waiting for a status line.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
            state: State::Head,
        }
    }

    /// Whether [`ParseEvent::Complete`] has been produced.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state == State::Done
    }

    /// Feed bytes and collect the events they complete.
    ///
    /// Bytes after the end of the response are discarded.
    pub fn execute(&mut self, data: &[u8]) -> Result<Vec<ParseEvent>, TransportError> {
        let mut events = Vec::new();
        if self.state == State::Done {
            return Ok(events);
        }

        self.buf.extend_from_slice(data);
        while self.step(&mut events)? {}
        Ok(events)
    }

    /// Signal that the peer closed the connection.
    ///
    /// Completes a body delimited by connection close. Any other partial
    /// response produces nothing.
    pub fn finish(&mut self) -> Vec<ParseEvent> {
        let mut events = Vec::new();
        if self.state == State::UntilClose {
            self.read_until_close(&mut events);
            self.complete(&mut events);
        }
        events
    }

    fn step(&mut self, events: &mut Vec<ParseEvent>) -> Result<bool, TransportError> {
        match self.state {
            State::Head => self.parse_head(events),
            State::Length(remaining) => Ok(self.read_fixed(remaining, events)),
            State::ChunkSize => self.parse_chunk_size(),
            State::ChunkData(remaining) => Ok(self.read_chunk_data(remaining, events)),
            State::ChunkDataEnd => self.parse_chunk_data_end(),
            State::Trailers => self.parse_trailers(events),
            State::UntilClose => Ok(self.read_until_close(events)),
            State::Done => {
                self.buf.clear();
                Ok(false)
            }
        }
    }

    fn parse_head(&mut self, events: &mut Vec<ParseEvent>) -> Result<bool, TransportError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut response = httparse::Response::new(&mut headers);

        let consumed = match response
            .parse(&self.buf)
            .map_err(|e| TransportError::parse(e.to_string()))?
        {
            Status::Complete(consumed) => consumed,
            Status::Partial if self.buf.len() > MAX_HEAD_SIZE => {
                return Err(TransportError::parse("response head too large"));
            }
            Status::Partial => return Ok(false),
        };

        let status = response.code.unwrap_or_default();
        let head = ResponseHead {
            status,
            reason: response.reason.unwrap_or_default().to_string(),
            headers: collect_headers(response.headers),
        };
        let next = body_state(&head)?;
        self.buf.advance(consumed);

        // Interim responses carry no body and precede the real one.
        if (100..200).contains(&status) && status != 101 {
            return Ok(true);
        }

        events.push(ParseEvent::Headers(head));
        match next {
            Some(state) => self.state = state,
            None => self.complete(events),
        }
        Ok(true)
    }

    fn read_fixed(&mut self, remaining: u64, events: &mut Vec<ParseEvent>) -> bool {
        let Some(left) = self.take_body(remaining, events) else {
            return false;
        };
        if left == 0 {
            self.complete(events);
        } else {
            self.state = State::Length(left);
        }
        true
    }

    fn parse_chunk_size(&mut self) -> Result<bool, TransportError> {
        let Some(end) = find_crlf(&self.buf) else {
            if self.buf.len() > MAX_CHUNK_LINE {
                return Err(TransportError::parse("chunk size line too long"));
            }
            return Ok(false);
        };

        let line = std::str::from_utf8(&self.buf[..end])
            .map_err(|_| TransportError::parse("chunk size line is not ASCII"))?;
        let size_hex = line.split(';').next().unwrap_or_default().trim();
        let size = u64::from_str_radix(size_hex, 16)
            .map_err(|_| TransportError::parse(format!("invalid chunk size {size_hex:?}")))?;

        self.buf.advance(end + 2);
        self.state = if size == 0 {
            State::Trailers
        } else {
            State::ChunkData(size)
        };
        Ok(true)
    }

    fn read_chunk_data(&mut self, remaining: u64, events: &mut Vec<ParseEvent>) -> bool {
        let Some(left) = self.take_body(remaining, events) else {
            return false;
        };
        self.state = if left == 0 {
            State::ChunkDataEnd
        } else {
            State::ChunkData(left)
        };
        true
    }

    fn parse_chunk_data_end(&mut self) -> Result<bool, TransportError> {
        if self.buf.len() < 2 {
            return Ok(false);
        }
        if &self.buf[..2] != b"\r\n" {
            return Err(TransportError::parse("missing CRLF after chunk data"));
        }
        self.buf.advance(2);
        self.state = State::ChunkSize;
        Ok(true)
    }

    fn parse_trailers(&mut self, events: &mut Vec<ParseEvent>) -> Result<bool, TransportError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        match httparse::parse_headers(&self.buf, &mut headers)
            .map_err(|e| TransportError::parse(e.to_string()))?
        {
            Status::Complete((consumed, parsed)) => {
                let trailers = collect_headers(parsed);
                self.buf.advance(consumed);
                if !trailers.is_empty() {
                    events.push(ParseEvent::Trailers(trailers));
                }
                self.complete(events);
                Ok(true)
            }
            Status::Partial if self.buf.len() > MAX_HEAD_SIZE => {
                Err(TransportError::parse("trailer section too large"))
            }
            Status::Partial => Ok(false),
        }
    }

    fn read_until_close(&mut self, events: &mut Vec<ParseEvent>) -> bool {
        if self.buf.is_empty() {
            return false;
        }
        events.push(ParseEvent::Body(self.buf.split().freeze()));
        true
    }

    /// Emit up to `remaining` buffered body bytes. Returns what is left, or
    /// `None` if nothing was buffered.
    fn take_body(&mut self, remaining: u64, events: &mut Vec<ParseEvent>) -> Option<u64> {
        if self.buf.is_empty() {
            return None;
        }
        let available = u64::try_from(self.buf.len()).unwrap_or(u64::MAX);
        let take = remaining.min(available);
        // `take` is bounded by the buffer length.
        let chunk = self.buf.split_to(take as usize).freeze();
        events.push(ParseEvent::Body(chunk));
        Some(remaining - take)
    }

    fn complete(&mut self, events: &mut Vec<ParseEvent>) {
        events.push(ParseEvent::Complete);
        self.state = State::Done;
        self.buf.clear();
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_headers(raw: &[httparse::Header<'_>]) -> HeaderList {
    let mut headers: HeaderList = Vec::with_capacity(raw.len());
    for header in raw {
        let value = std::str::from_utf8(header.value).ok().map(str::to_string);
        match headers
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(header.name))
        {
            Some((_, existing)) => {
                *existing = match (existing.take(), value) {
                    (Some(first), Some(next)) => Some(format!("{first}, {next}")),
                    (first, next) => first.or(next),
                };
            }
            None => headers.push((header.name.to_string(), value)),
        }
    }
    headers
}

/// Decide how the body of `head` is delimited. `None` means no body.
fn body_state(head: &ResponseHead) -> Result<Option<State>, TransportError> {
    if (100..200).contains(&head.status) || head.status == 204 || head.status == 304 {
        return Ok(None);
    }

    if let Some(encoding) = head.header("transfer-encoding") {
        let chunked = encoding
            .rsplit(',')
            .next()
            .is_some_and(|last| last.trim().eq_ignore_ascii_case("chunked"));
        return Ok(Some(if chunked {
            State::ChunkSize
        } else {
            State::UntilClose
        }));
    }

    if let Some(length) = head.header("content-length") {
        let mut values = length.split(',').map(str::trim);
        let first = values.next().unwrap_or_default();
        if values.any(|other| other != first) {
            return Err(TransportError::parse("conflicting content-length values"));
        }
        let length: u64 = first
            .parse()
            .map_err(|_| TransportError::parse(format!("invalid content-length {first:?}")))?;
        return Ok((length > 0).then_some(State::Length(length)));
    }

    Ok(Some(State::UntilClose))
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn body(events: &[ParseEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                ParseEvent::Body(b) => Some(b.to_vec()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    #[test]
    fn test_content_length_across_segments() {
        let mut parser = ResponseParser::new();

        let first = parser
            .execute(b"HTTP/1.1 200 OK\r\nContent-Length: 9\r\n\r\nabc")
            .unwrap();
        assert_eq!(first.len(), 2);
        match &first[0] {
            ParseEvent::Headers(head) => {
                assert_eq!(head.status, 200);
                assert_eq!(head.reason, "OK");
                assert_eq!(head.header("content-length"), Some("9"));
            }
            other => panic!("expected headers, got {other:?}"),
        }
        assert_eq!(first[1], ParseEvent::Body(Bytes::from_static(b"abc")));

        let second = parser.execute(b"def").unwrap();
        assert_eq!(second, vec![ParseEvent::Body(Bytes::from_static(b"def"))]);

        let third = parser.execute(b"ghi").unwrap();
        assert_eq!(
            third,
            vec![
                ParseEvent::Body(Bytes::from_static(b"ghi")),
                ParseEvent::Complete
            ]
        );
        assert!(parser.is_complete());
    }

    #[test]
    fn test_chunked_byte_by_byte() {
        let wire: &[u8] =
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5;ext=1\r\nhello\r\nB\r\n, streaming\r\n0\r\ngrpc-status: 0\r\n\r\n";

        let mut parser = ResponseParser::new();
        let mut events = Vec::new();
        for byte in wire {
            events.extend(parser.execute(std::slice::from_ref(byte)).unwrap());
        }

        assert_eq!(body(&events), b"hello, streaming");
        assert!(events.contains(&ParseEvent::Trailers(vec![(
            "grpc-status".to_string(),
            Some("0".to_string())
        )])));
        assert_eq!(events.last(), Some(&ParseEvent::Complete));
    }

    #[test]
    fn test_chunked_without_trailers() {
        let mut parser = ResponseParser::new();
        let events = parser
            .execute(b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\n")
            .unwrap();
        assert_eq!(body(&events), b"abc");
        assert!(!events.iter().any(|e| matches!(e, ParseEvent::Trailers(_))));
        assert_eq!(events.last(), Some(&ParseEvent::Complete));
    }

    #[test]
    fn test_duplicate_headers_joined() {
        let mut parser = ResponseParser::new();
        let events = parser
            .execute(b"HTTP/1.1 200 OK\r\nX-A: 1\r\nx-a: 2\r\nContent-Length: 0\r\n\r\n")
            .unwrap();
        let ParseEvent::Headers(head) = &events[0] else {
            panic!("expected headers");
        };
        assert_eq!(
            head.headers[0],
            ("X-A".to_string(), Some("1, 2".to_string()))
        );
        assert_eq!(events[1], ParseEvent::Complete);
    }

    #[test]
    fn test_non_utf8_value_is_missing() {
        let mut parser = ResponseParser::new();
        let events = parser
            .execute(b"HTTP/1.1 200 OK\r\nx-bin: \xff\xfe\r\ncontent-length: 0\r\n\r\n")
            .unwrap();
        let ParseEvent::Headers(head) = &events[0] else {
            panic!("expected headers");
        };
        assert_eq!(head.headers[0], ("x-bin".to_string(), None));
    }

    #[test]
    fn test_informational_response_skipped() {
        let mut parser = ResponseParser::new();
        let events = parser
            .execute(b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 204 No Content\r\n\r\n")
            .unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ParseEvent::Headers(h) if h.status == 204));
        assert_eq!(events[1], ParseEvent::Complete);
    }

    #[test]
    fn test_body_until_close() {
        let mut parser = ResponseParser::new();
        let events = parser.execute(b"HTTP/1.1 200 OK\r\n\r\npartial").unwrap();
        assert_eq!(body(&events), b"partial");
        assert!(!parser.is_complete());

        assert_eq!(parser.finish(), vec![ParseEvent::Complete]);
        assert!(parser.is_complete());
    }

    #[test]
    fn test_truncated_response_finishes_silently() {
        let mut parser = ResponseParser::new();
        parser
            .execute(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc")
            .unwrap();
        assert!(parser.finish().is_empty());
        assert!(!parser.is_complete());
    }

    #[test]
    fn test_malformed_responses() {
        let mut parser = ResponseParser::new();
        assert!(matches!(
            parser.execute(b"NOT-HTTP garbage\r\n\r\n"),
            Err(TransportError::Parse { .. })
        ));

        let mut parser = ResponseParser::new();
        assert!(matches!(
            parser.execute(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n"),
            Err(TransportError::Parse { .. })
        ));

        let mut parser = ResponseParser::new();
        assert!(matches!(
            parser.execute(b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\nContent-Length: 2\r\n\r\n"),
            Err(TransportError::Parse { .. })
        ));
    }

    #[test]
    fn test_bytes_after_complete_are_ignored() {
        let mut parser = ResponseParser::new();
        let events = parser
            .execute(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nokEXTRA")
            .unwrap();
        assert_eq!(body(&events), b"ok");
        assert!(parser.execute(b"more").unwrap().is_empty());
    }
}
