//! Event frame codec.
//!
//! Each event travels as one text frame: `data: <json>\n\n`. The stream ends
//! with the sentinel [`DONE_FRAME`], which is not an event. Readers may see
//! several frames in one network read or a frame split across reads, so
//! decoding is incremental and line-buffered.

use crate::error::{ParleyError, ParleyResult};
use crate::event::StreamEvent;
use tracing::debug;

/// The terminal marker closing every event stream.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

const DATA_PREFIX: &str = "data:";
const DONE_PAYLOAD: &str = "[DONE]";

/// A decoded frame: an event or the end-of-stream marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A regular event payload.
    Event(StreamEvent),
    /// The terminal marker; nothing follows it.
    Done,
}

/// Encodes an event as a transport-ready frame.
pub fn encode(event: &StreamEvent) -> ParleyResult<String> {
    let json = serde_json::to_string(event).map_err(|e| ParleyError::Codec(e.to_string()))?;
    Ok(format!("{DATA_PREFIX} {json}\n\n"))
}

/// The terminal marker frame.
pub fn encode_done() -> &'static str {
    DONE_FRAME
}

/// Decodes every complete frame in `raw`, including an unterminated last line.
pub fn decode(raw: &str) -> Vec<Frame> {
    let mut decoder = FrameDecoder::new();
    let mut frames = decoder.push(raw.as_bytes());
    frames.extend(decoder.finish());
    frames
}

/// Incremental frame decoder.
///
/// Bytes are buffered until a full line is available, so partial frames
/// (and UTF-8 sequences split between reads) are reassembled. Payloads that
/// are not well-formed events are skipped.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one network read and returns the frames it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            if let Some(frame) = parse_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flushes a trailing line that was never newline-terminated.
    pub fn finish(&mut self) -> Option<Frame> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest)
    }
}

fn parse_line(raw: &[u8]) -> Option<Frame> {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim();

    // Blank separators and `:` comments carry nothing.
    if line.is_empty() || line.starts_with(':') {
        return None;
    }

    let payload = line.strip_prefix(DATA_PREFIX)?.trim_start();
    if payload == DONE_PAYLOAD {
        return Some(Frame::Done);
    }

    match serde_json::from_str::<StreamEvent>(payload) {
        Ok(event) => Some(Frame::Event(event)),
        Err(e) => {
            debug!(error = %e, payload_len = payload.len(), "Skipping malformed event frame");
            None
        }
    }
}
