//! Line-delimited JSON wire protocol.
//!
//! Both servers speak the same framing: one JSON object per `\n`-terminated
//! line in each direction. The only exception is STREAM, whose payload is a
//! sequence of NUL-terminated plain-text tokens ending with `STOP`.
//!
//! - [`codec`] - frame detection and the [`codec::LineCodec`]
//! - [`message`] - typed [`message::Request`] / [`message::Response`] wrappers

pub mod codec;
pub mod message;

use bytes::Bytes;

pub use codec::{LineCodec, ProtocolCodec};
pub use message::{Request, Response};

/// Sentinel token that ends a STREAM.
pub const STREAM_STOP: &str = "STOP";

/// Result of decoding a frame from the wire.
#[derive(Debug)]
pub enum DecodeResult<T> {
    /// A complete frame was decoded.
    Complete(T),
    /// More data is needed to complete the frame.
    Incomplete,
    /// A frame was consumed but its content is invalid.
    Invalid(String),
}

/// Result of encoding a response to the wire.
#[derive(Debug)]
pub enum EncodeResult {
    /// Successfully encoded.
    Ok(Bytes),
    /// Encoding failed.
    Error(String),
}

/// Scan for a LF line ending. Returns the length of the line including it.
pub fn find_lf(data: &[u8]) -> Option<usize> {
    data.iter().position(|&b| b == b'\n').map(|pos| pos + 1)
}
