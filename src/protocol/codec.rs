//! Protocol codec traits.
//!
//! Defines the interface for encoding/decoding frames and the newline JSON
//! codec both servers use.

use super::message::{Request, Response};
use super::{find_lf, DecodeResult, EncodeResult};
use bytes::{BufMut, Bytes, BytesMut};

/// Default upper bound for a single request line.
pub const DEFAULT_MAX_LINE: usize = 1024 * 1024;

/// Trait for protocol codecs.
///
/// A codec handles encoding responses and decoding requests for a specific
/// wire protocol.
pub trait ProtocolCodec: Send + Sync {
    /// The request type decoded from the wire.
    type Request;

    /// The response type encoded to the wire.
    type Response;

    /// Attempt to decode a request from the buffer.
    ///
    /// Returns:
    /// - `Complete(request)` if a full request was decoded
    /// - `Incomplete` if more data is needed
    /// - `Invalid(error)` if a frame was consumed but is malformed
    ///
    /// On `Complete` and `Invalid`, the codec consumes the frame from the buffer.
    fn decode(&self, buffer: &mut BytesMut) -> DecodeResult<Self::Request>;

    /// Encode a response to bytes.
    fn encode(&self, response: &Self::Response) -> EncodeResult;
}

/// Newline-delimited JSON codec.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_line: usize,
}

impl LineCodec {
    /// Create a codec with the default line limit.
    pub fn new() -> Self {
        Self {
            max_line: DEFAULT_MAX_LINE,
        }
    }

    /// Create a codec with a custom line limit.
    pub fn with_max_line(max_line: usize) -> Self {
        Self { max_line }
    }

    /// Encode one STREAM token: the text followed by a NUL byte.
    pub fn encode_token(&self, token: &str) -> Bytes {
        let mut buf = BytesMut::with_capacity(token.len() + 1);
        buf.put_slice(token.as_bytes());
        buf.put_u8(0);
        buf.freeze()
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolCodec for LineCodec {
    type Request = Request;
    type Response = Response;

    fn decode(&self, buffer: &mut BytesMut) -> DecodeResult<Request> {
        loop {
            let Some(len) = find_lf(&buffer[..]) else {
                if buffer.len() > self.max_line {
                    buffer.clear();
                    return DecodeResult::Invalid("request line too long".to_string());
                }
                return DecodeResult::Incomplete;
            };

            let frame = buffer.split_to(len);
            let line = match std::str::from_utf8(&frame) {
                Ok(line) => line.trim_end_matches(['\n', '\r']),
                Err(_) => return DecodeResult::Invalid("request is not UTF-8".to_string()),
            };

            // Blank keep-alive lines carry no request.
            if line.trim().is_empty() {
                continue;
            }

            return match Request::parse(line) {
                Ok(request) => DecodeResult::Complete(request),
                Err(e) => DecodeResult::Invalid(e.to_string()),
            };
        }
    }

    fn encode(&self, response: &Response) -> EncodeResult {
        EncodeResult::Ok(Bytes::from(response.to_line()))
    }
}
