// src/io/serial/framer.rs
//
// Newline framing for the device's text protocol.
// Accumulates bytes across reads and emits one RawFrame per newline-terminated
// segment. Undecodable segments are still emitted (with a placeholder) so the
// consumer sees every line the device sent.

use crate::io::error::LinkError;

/// Largest unterminated line we will buffer before giving up on the stream
pub const MAX_LINE_LENGTH: usize = 4096;

const DELIMITER: u8 = b'\n';

// =============================================================================
// Types
// =============================================================================

/// One decoded line from the device, trailing whitespace removed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    pub text: String,
    /// True when the bytes were not valid UTF-8 and `text` is a placeholder
    pub decode_error: bool,
}

impl RawFrame {
    fn decode(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => RawFrame {
                text: text.trim_end().to_string(),
                decode_error: false,
            },
            Err(_) => RawFrame {
                text: format!("<invalid utf-8: {}>", hex::encode(bytes)),
                decode_error: true,
            },
        }
    }
}

/// Returned when the pending line outgrows the buffer limit.
///
/// Lines completed earlier in the same push are carried along so they can
/// still be delivered before the session is torn down.
#[derive(Debug)]
pub struct FramingOverflow {
    pub completed: Vec<RawFrame>,
    pub max: usize,
    pub buffered: usize,
}

impl From<FramingOverflow> for LinkError {
    fn from(o: FramingOverflow) -> Self {
        LinkError::Framing {
            max: o.max,
            buffered: o.buffered,
        }
    }
}

// =============================================================================
// Line Framer
// =============================================================================

#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    max_length: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        LineFramer::new(MAX_LINE_LENGTH)
    }
}

impl LineFramer {
    pub fn new(max_length: usize) -> Self {
        LineFramer {
            buffer: Vec::with_capacity(256),
            max_length,
        }
    }

    /// Feed bytes from one read. Returns every line completed by this chunk.
    ///
    /// On overflow the partial line is discarded and the framer is left empty.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<RawFrame>, FramingOverflow> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.buffer[start..].iter().position(|&b| b == DELIMITER) {
            let end = start + pos;
            frames.push(RawFrame::decode(&self.buffer[start..end]));
            start = end + 1;
        }
        self.buffer.drain(..start);

        if self.buffer.len() > self.max_length {
            let buffered = self.buffer.len();
            self.buffer.clear();
            return Err(FramingOverflow {
                completed: frames,
                max: self.max_length,
                buffered,
            });
        }

        Ok(frames)
    }

    /// Bytes waiting for a newline
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

// =============================================================================
// Tests
// =============================================================================
