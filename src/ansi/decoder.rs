//! Incremental segmentation of a byte stream into text and control sequences.

use tracing::debug;

use crate::ansi::style::parse_sgr_params;

const ESC: u8 = 0x1b;

/// Bytes at or above this value terminate a CSI sequence.
const CSI_FINAL_MIN: u8 = 0x40;

/// Longest CSI sequence kept while waiting for its final byte. A longer one
/// is treated as text.
const MAX_SEQUENCE_LEN: usize = 256;

/// A control sequence found in the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlSequence {
    /// `ESC [ params final`.
    Csi {
        /// Bytes between `ESC [` and the final byte.
        params: String,
        /// Terminating byte, at least `0x40`.
        final_byte: u8,
    },
    /// `ESC x` for any `x` other than `[`.
    Escape(u8),
}

impl ControlSequence {
    /// SGR codes if this is a `CSI … m` sequence.
    #[must_use]
    pub fn sgr_codes(&self) -> Option<Vec<u16>> {
        match self {
            Self::Csi {
                params,
                final_byte: b'm',
            } => Some(parse_sgr_params(params)),
            _ => None,
        }
    }
}

/// Receives the segments produced by [`AnsiDecoder`].
pub trait AnsiSink {
    /// A run of text without control sequences.
    fn plaintext(&mut self, text: &str);

    /// A complete control sequence.
    fn control(&mut self, sequence: &ControlSequence);
}

/// Incremental decoder.
///
/// Bytes may arrive in arbitrary chunks. An escape sequence or UTF-8
/// character split across chunks is held back until the rest arrives.
#[derive(Debug, Default)]
pub struct AnsiDecoder {
    pending: Vec<u8>,
}

impl AnsiDecoder {
    /// New decoder with nothing buffered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes`, delivering every complete segment to `sink`.
    pub fn feed<S: AnsiSink + ?Sized>(&mut self, bytes: &[u8], sink: &mut S) {
        self.pending.extend_from_slice(bytes);
        let consumed = decode(&self.pending, sink);
        self.pending.drain(..consumed);
    }

    /// Flush whatever is buffered at end of stream.
    ///
    /// A partial UTF-8 character is emitted as a replacement character; an
    /// unterminated escape sequence is dropped.
    pub fn finish<S: AnsiSink + ?Sized>(&mut self, sink: &mut S) {
        let leftover = std::mem::take(&mut self.pending);
        match leftover.first() {
            None => {}
            Some(&ESC) => debug!(len = leftover.len(), "dropping unterminated escape sequence"),
            Some(_) => sink.plaintext(&String::from_utf8_lossy(&leftover)),
        }
    }

    /// Number of bytes waiting for the rest of a sequence.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}

/// Decode as much of `buf` as possible and return the bytes consumed.
fn decode<S: AnsiSink + ?Sized>(buf: &[u8], sink: &mut S) -> usize {
    let mut pos = 0;
    while pos < buf.len() {
        if buf[pos] != ESC {
            let end = buf[pos..]
                .iter()
                .position(|&byte| byte == ESC)
                .map_or(buf.len(), |offset| pos + offset);
            let emitted = emit_text(&buf[pos..end], end == buf.len(), sink);
            pos += emitted;
            if pos < end {
                // Incomplete UTF-8 character at the end of the buffer.
                return pos;
            }
            continue;
        }

        let Some(&introducer) = buf.get(pos + 1) else {
            return pos;
        };
        if introducer != b'[' {
            sink.control(&ControlSequence::Escape(introducer));
            pos += 2;
            continue;
        }

        let params_start = pos + 2;
        match buf[params_start..]
            .iter()
            .position(|&byte| byte >= CSI_FINAL_MIN)
        {
            Some(offset) => {
                let final_index = params_start + offset;
                sink.control(&ControlSequence::Csi {
                    params: String::from_utf8_lossy(&buf[params_start..final_index]).into_owned(),
                    final_byte: buf[final_index],
                });
                pos = final_index + 1;
            }
            None if buf.len() - pos > MAX_SEQUENCE_LEN => {
                debug!("overlong escape sequence treated as text");
                sink.plaintext(&String::from_utf8_lossy(&buf[pos..params_start]));
                pos = params_start;
            }
            None => return pos,
        }
    }
    pos
}

/// Emit `run` as text and return how many bytes were used.
///
/// When `at_end` is set, a trailing incomplete UTF-8 character is left
/// unconsumed.
fn emit_text<S: AnsiSink + ?Sized>(run: &[u8], at_end: bool, sink: &mut S) -> usize {
    let usable = match std::str::from_utf8(run) {
        Ok(text) => {
            sink.plaintext(text);
            return run.len();
        }
        Err(err) if at_end && err.error_len().is_none() => err.valid_up_to(),
        Err(_) => run.len(),
    };
    if usable > 0 {
        sink.plaintext(&String::from_utf8_lossy(&run[..usable]));
    }
    usable
}
