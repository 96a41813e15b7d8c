//! Wire fixtures for HTTP/1.1 and gRPC-Web responses.
//!
//! These build the raw bytes a server would send, so tests can feed them to
//! a [`MockSocket`](crate::MockSocket) whole or split at any boundary.

use bytes::{BufMut, Bytes, BytesMut};

/// Content type used by the fixtures.
pub const GRPC_WEB_CONTENT_TYPE: &str = "application/grpc-web+proto";

/// A response head with the given status and headers.
#[must_use]
pub fn response_head(status: u16, headers: &[(&str, &str)]) -> Bytes {
    let reason = if status == 200 { "OK" } else { "Status" };
    let mut out = format!("HTTP/1.1 {status} {reason}\r\n");
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str("\r\n");
    Bytes::from(out)
}

/// A `200 OK` head announcing a chunked gRPC-Web body.
#[must_use]
pub fn chunked_head() -> Bytes {
    response_head(
        200,
        &[
            ("Content-Type", GRPC_WEB_CONTENT_TYPE),
            ("Transfer-Encoding", "chunked"),
        ],
    )
}

/// One chunk of a chunked body.
#[must_use]
pub fn chunk(data: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(data.len() + 12);
    out.put_slice(format!("{:x}\r\n", data.len()).as_bytes());
    out.put_slice(data);
    out.put_slice(b"\r\n");
    out.freeze()
}

/// The terminating chunk of a chunked body, without trailers.
#[must_use]
pub fn last_chunk() -> Bytes {
    Bytes::from_static(b"0\r\n\r\n")
}

/// The terminating chunk followed by trailer fields.
#[must_use]
pub fn last_chunk_with_trailers(trailers: &[(&str, &str)]) -> Bytes {
    let mut out = String::from("0\r\n");
    for (name, value) in trailers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str("\r\n");
    Bytes::from(out)
}

/// A complete `200 OK` response with a `Content-Length` body.
#[must_use]
pub fn fixed_response(body: &[u8]) -> Bytes {
    let mut out = BytesMut::new();
    out.put(response_head(
        200,
        &[
            ("Content-Type", GRPC_WEB_CONTENT_TYPE),
            ("Content-Length", &body.len().to_string()),
        ],
    ));
    out.put_slice(body);
    out.freeze()
}

/// A length-prefixed gRPC-Web data frame.
#[must_use]
pub fn grpc_web_frame(payload: &[u8]) -> Bytes {
    frame(0x00, payload)
}

/// A gRPC-Web trailer frame carrying `grpc-status`.
#[must_use]
pub fn grpc_web_trailers(status: u32) -> Bytes {
    frame(0x80, format!("grpc-status:{status}\r\n").as_bytes())
}

fn frame(flag: u8, payload: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(payload.len() + 5);
    out.put_u8(flag);
    out.put_u32(payload.len() as u32);
    out.put_slice(payload);
    out.freeze()
}
