//! Length-prefixed frame codec.
//!
//! Every message is a header block followed by a JSON body:
//!
//! ```text
//! Content-Length: 52\r\n
//! Content-Type: application/sce-jsonrpc; charset=utf-8\r\n
//! \r\n
//! {"id":"1","jsonrpc":"2.0","method":"initialize",...}
//! ```
//!
//! [`FrameCodec`] plugs the same framing into
//! [`tokio_util::codec`] for use with `FramedRead` / `FramedWrite` or a
//! hand-fed [`BytesMut`] buffer.

use bytes::{Buf, BufMut, BytesMut};
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};

use crate::lsp::message::Message;
use crate::{AppError, Result};

/// Value of the `Content-Type` header.
pub const CONTENT_TYPE: &str = "application/sce-jsonrpc; charset=utf-8";

/// Largest header block accepted before its terminating blank line.
pub const MAX_HEADER_BYTES: usize = 4096;

/// Largest body accepted: 16 MiB.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

const HEADER_END: &[u8] = b"\r\n\r\n";
const CONTENT_LENGTH: &str = "Content-Length";

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Parsed JSON body.
    pub body: Value,
    /// Header plus body length; bytes after this belong to the next frame.
    pub consumed: usize,
}

/// Encode `message` as a complete frame.
///
/// # Errors
///
/// Returns `AppError::Protocol` if the body cannot be serialised.
pub fn encode(message: &Message) -> Result<Vec<u8>> {
    encode_body(&message.to_json())
}

/// Encode an arbitrary JSON body as a complete frame.
///
/// # Errors
///
/// Returns `AppError::Protocol` if the body cannot be serialised.
pub fn encode_body(body: &Value) -> Result<Vec<u8>> {
    let content = serde_json::to_vec(body)?;
    let header = format!(
        "{CONTENT_LENGTH}: {}\r\nContent-Type: {CONTENT_TYPE}\r\n\r\n",
        content.len()
    );
    let mut frame = Vec::with_capacity(header.len() + content.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(&content);
    Ok(frame)
}

/// Whether `buf` starts with a header and the full declared body.
///
/// Bytes past the end of the frame do not matter.
#[must_use]
pub fn is_complete(buf: &[u8]) -> bool {
    matches!(
        parse_header(buf),
        Ok(Some(header)) if buf.len() >= header.frame_len()
    )
}

/// Decode the frame at the start of `buf`.
///
/// # Errors
///
/// Returns `AppError::Protocol` if the header is malformed, lacks or exceeds
/// the allowed `Content-Length`, the body is not fully present, or the body
/// is not valid JSON.
pub fn decode(buf: &[u8]) -> Result<Frame> {
    let header =
        parse_header(buf)?.ok_or_else(|| AppError::Protocol("incomplete header".into()))?;
    let consumed = header.frame_len();
    if buf.len() < consumed {
        return Err(AppError::Protocol(format!(
            "incomplete body: declared {} bytes, have {}",
            header.content_length,
            buf.len() - header.header_len
        )));
    }
    let body = serde_json::from_slice(&buf[header.header_len..consumed])?;
    Ok(Frame { body, consumed })
}

#[derive(Debug, Clone, Copy)]
struct Header {
    header_len: usize,
    content_length: usize,
}

impl Header {
    fn frame_len(self) -> usize {
        self.header_len + self.content_length
    }
}

/// Parse the header block. `Ok(None)` means it is not complete yet.
fn parse_header(buf: &[u8]) -> Result<Option<Header>> {
    let Some(end) = find(buf, HEADER_END) else {
        if buf.len() > MAX_HEADER_BYTES {
            return Err(AppError::Protocol(format!(
                "header exceeds {MAX_HEADER_BYTES} bytes"
            )));
        }
        return Ok(None);
    };

    let text = std::str::from_utf8(&buf[..end])
        .map_err(|_| AppError::Protocol("header is not valid UTF-8".into()))?;

    let mut content_length = None;
    for line in text.split("\r\n").filter(|line| !line.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| AppError::Protocol(format!("malformed header line {line:?}")))?;
        if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
            let length: usize = value.trim().parse().map_err(|_| {
                AppError::Protocol(format!("invalid {CONTENT_LENGTH} {:?}", value.trim()))
            })?;
            content_length = Some(length);
        }
    }

    let content_length = content_length
        .ok_or_else(|| AppError::Protocol(format!("missing {CONTENT_LENGTH} header")))?;
    if content_length > MAX_FRAME_BYTES {
        return Err(AppError::Protocol(format!(
            "frame of {content_length} bytes exceeds {MAX_FRAME_BYTES}"
        )));
    }

    Ok(Some(Header {
        header_len: end + HEADER_END.len(),
        content_length,
    }))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// [`tokio_util::codec`] adapter for the frame format.
///
/// Decoding yields raw JSON bodies; classify them with
/// [`Incoming::from_body`](crate::lsp::message::Incoming::from_body).
///
/// # Decoder
///
/// Incomplete input yields `Ok(None)` and stays buffered. On an error only
/// the malformed prefix is dropped: everything up to the next
/// `Content-Length` header, or the whole frame when just its body is
/// invalid. Later frames remain decodable.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a codec.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = Value;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let header = match parse_header(src) {
            Ok(Some(header)) => header,
            Ok(None) => return Ok(None),
            Err(err) => {
                discard_malformed_prefix(src);
                return Err(err);
            }
        };

        let frame_len = header.frame_len();
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let frame = src.split_to(frame_len);
        let body = serde_json::from_slice(&frame[header.header_len..])?;
        Ok(Some(body))
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = AppError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        dst.put_slice(&encode(&item)?);
        Ok(())
    }
}

impl Encoder<Value> for FrameCodec {
    type Error = AppError;

    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<()> {
        dst.put_slice(&encode_body(&item)?);
        Ok(())
    }
}

/// Drop bytes up to the next `Content-Length` header after the start, or
/// everything if there is none. Always drops at least one byte.
fn discard_malformed_prefix(src: &mut BytesMut) {
    let skip = src
        .get(1..)
        .and_then(|rest| find(rest, CONTENT_LENGTH.as_bytes()))
        .map_or(src.len(), |offset| offset + 1);
    src.advance(skip.max(1).min(src.len()));
}
