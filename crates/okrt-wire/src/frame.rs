//! Frame decoding for the three streaming framing families.
//!
//! A decoder consumes an unbounded, arbitrarily chunked text stream and
//! produces an ordered sequence of [`RawFrame`] values. Decoding is
//! chunk-boundary invariant: splitting one logical stream into any number of
//! chunks yields the same frame sequence.

use thiserror::Error;

/// One decoded protocol record, pre-interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFrame {
    /// A data-bearing record, with the event name when the framing carries one.
    Record {
        /// Event name from an `event:` field, if any.
        event: Option<String>,
        /// The payload text: a JSON document or opaque text.
        data: String,
    },
    /// The explicit stream terminator sentinel (`data: [DONE]`).
    Done,
}

/// The framing family a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Event-tagged text frames separated by blank lines (SSE).
    EventStream,
    /// One JSON record per line.
    JsonLines,
    /// Back-to-back JSON objects with no external framing.
    JsonObjects,
}

/// Errors surfaced at true end-of-stream.
#[derive(Error, Debug)]
pub enum FrameDecodeError {
    /// Bytes remained that can never form a complete frame.
    #[error("undecodable trailing bytes at end of stream: {preview:?}")]
    TrailingBytes {
        /// The first part of the leftover text, for logging.
        preview: String,
    },
}

/// A frame decoder for one framing family.
#[derive(Debug)]
pub enum FrameDecoder {
    /// Event-tagged SSE decoder.
    EventStream(SseDecoder),
    /// Newline-delimited JSON decoder.
    JsonLines(JsonLinesDecoder),
    /// Self-delimited JSON object decoder.
    JsonObjects(JsonObjectDecoder),
}

impl FrameDecoder {
    /// Creates the decoder for the given framing family.
    pub fn for_framing(framing: Framing) -> Self {
        match framing {
            Framing::EventStream => Self::EventStream(SseDecoder::new()),
            Framing::JsonLines => Self::JsonLines(JsonLinesDecoder::new()),
            Framing::JsonObjects => Self::JsonObjects(JsonObjectDecoder::new()),
        }
    }

    /// Feeds one chunk of upstream text, returning every frame it completed.
    pub fn push(&mut self, chunk: &str) -> Vec<RawFrame> {
        match self {
            Self::EventStream(d) => d.push(chunk),
            Self::JsonLines(d) => d.push(chunk),
            Self::JsonObjects(d) => d.push(chunk),
        }
    }

    /// Signals true end-of-stream, flushing whatever can still be decoded.
    pub fn finish(&mut self) -> Result<Vec<RawFrame>, FrameDecodeError> {
        match self {
            Self::EventStream(d) => Ok(d.finish()),
            Self::JsonLines(d) => Ok(d.finish()),
            Self::JsonObjects(d) => d.finish(),
        }
    }
}

/// Reassembles UTF-8 text from arbitrarily split byte chunks.
///
/// Network chunks can cut a multi-byte character anywhere; decoding each
/// chunk on its own would turn the severed halves into replacement
/// characters. This carries an incomplete trailing sequence (1-3 bytes)
/// forward to the next chunk. Genuinely invalid bytes still become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Carry {
    tail: Vec<u8>,
}

impl Utf8Carry {
    /// Creates an empty carry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one byte chunk, returning every complete character decoded.
    pub fn push(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.tail);
        bytes.extend_from_slice(chunk);

        let mut out = String::new();
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    return out;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        // Invalid sequence mid-stream: replace and move on.
                        Some(len) => {
                            out.push('\u{fffd}');
                            rest = &after[len..];
                        }
                        // Incomplete sequence at the end: carry it.
                        None => {
                            self.tail = after.to_vec();
                            return out;
                        }
                    }
                }
            }
        }
    }

    /// Flushes at true end-of-stream; a dangling partial character can no
    /// longer complete and decodes lossily.
    pub fn finish(&mut self) -> String {
        let tail = std::mem::take(&mut self.tail);
        String::from_utf8_lossy(&tail).into_owned()
    }
}

// ---------------------------------------------------------------------------
// Event-tagged family (SSE)
// ---------------------------------------------------------------------------

/// Decoder for the event-tagged family.
///
/// A frame completes only at a blank line. Multiple `data:` lines within one
/// frame join with a newline. Comment lines (leading `:`) are skipped.
/// `data: [DONE]` becomes the distinct [`RawFrame::Done`] sentinel.
#[derive(Debug, Default)]
pub struct SseDecoder {
    carry: String,
    event: Option<String>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk; the trailing partial line stays in the carry buffer.
    pub fn push(&mut self, chunk: &str) -> Vec<RawFrame> {
        self.carry.push_str(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.carry.find('\n') {
            let line: String = self.carry.drain(..=pos).collect();
            self.take_line(line.trim_end_matches(['\n', '\r']), &mut frames);
        }
        frames
    }

    /// Flushes a final frame that the stream never blank-line-terminated.
    pub fn finish(&mut self) -> Vec<RawFrame> {
        let mut frames = Vec::new();
        if !self.carry.is_empty() {
            let line = std::mem::take(&mut self.carry);
            self.take_line(line.trim_end_matches('\r'), &mut frames);
        }
        if let Some(frame) = self.complete_frame() {
            frames.push(frame);
        }
        frames
    }

    fn take_line(&mut self, line: &str, frames: &mut Vec<RawFrame>) {
        if line.is_empty() {
            if let Some(frame) = self.complete_frame() {
                frames.push(frame);
            }
        } else if line.starts_with(':') {
            // SSE comment
        } else if let Some(rest) = line.strip_prefix("event:") {
            self.event = Some(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            self.data_lines
                .push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        }
        // Unknown fields (id:, retry:) are ignored.
    }

    fn complete_frame(&mut self) -> Option<RawFrame> {
        let event = self.event.take();
        if self.data_lines.is_empty() {
            return None;
        }
        let data = self.data_lines.join("\n");
        self.data_lines.clear();
        if data.trim() == "[DONE]" {
            Some(RawFrame::Done)
        } else {
            Some(RawFrame::Record { event, data })
        }
    }
}

// ---------------------------------------------------------------------------
// Newline-delimited family
// ---------------------------------------------------------------------------

/// Decoder for newline-delimited JSON records.
///
/// Blank lines are discarded; the final partial line is deferred until the
/// next chunk, or until [`JsonLinesDecoder::finish`].
#[derive(Debug, Default)]
pub struct JsonLinesDecoder {
    carry: String,
}

impl JsonLinesDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk, returning one frame per completed non-blank line.
    pub fn push(&mut self, chunk: &str) -> Vec<RawFrame> {
        self.carry.push_str(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.carry.find('\n') {
            let line: String = self.carry.drain(..=pos).collect();
            let line = line.trim();
            if !line.is_empty() {
                frames.push(RawFrame::Record {
                    event: None,
                    data: line.to_string(),
                });
            }
        }
        frames
    }

    /// Emits the deferred final line, if any.
    pub fn finish(&mut self) -> Vec<RawFrame> {
        let line = std::mem::take(&mut self.carry);
        let line = line.trim();
        if line.is_empty() {
            Vec::new()
        } else {
            vec![RawFrame::Record {
                event: None,
                data: line.to_string(),
            }]
        }
    }
}

// ---------------------------------------------------------------------------
// Self-delimited family
// ---------------------------------------------------------------------------

/// Decoder for back-to-back JSON objects with no external framing.
///
/// Scans byte by byte, tracking brace depth and in-string/escape state; an
/// escaped quote does not toggle string mode. A balanced top-level object
/// yields a frame immediately. Bytes between objects (whitespace and the
/// `[`/`]`/`,` separators of a streamed JSON array) are skipped. Unbalanced
/// trailing text is retained and prepended to the next chunk.
#[derive(Debug, Default)]
pub struct JsonObjectDecoder {
    carry: String,
}

impl JsonObjectDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk, returning one frame per balanced object.
    pub fn push(&mut self, chunk: &str) -> Vec<RawFrame> {
        self.carry.push_str(chunk);
        let mut frames = Vec::new();

        let bytes = self.carry.as_bytes();
        let mut object_start: Option<usize> = None;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        for (i, &b) in bytes.iter().enumerate() {
            if object_start.is_none() {
                if b == b'{' {
                    object_start = Some(i);
                    depth = 1;
                }
                continue;
            }
            if in_string {
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == b'"' {
                    in_string = false;
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        let start = object_start.take().unwrap_or(i);
                        frames.push(RawFrame::Record {
                            event: None,
                            data: self.carry[start..=i].to_string(),
                        });
                    }
                }
                _ => {}
            }
        }

        // Retain the unbalanced tail; drop consumed objects and separators.
        match object_start {
            Some(start) => self.carry = self.carry.split_off(start),
            None => self.carry.clear(),
        }
        frames
    }

    /// Fails if a partial object remains at true end-of-stream.
    pub fn finish(&mut self) -> Result<Vec<RawFrame>, FrameDecodeError> {
        let leftover = std::mem::take(&mut self.carry);
        if leftover.trim().is_empty() {
            Ok(Vec::new())
        } else {
            let preview: String = leftover.chars().take(64).collect();
            Err(FrameDecodeError::TrailingBytes { preview })
        }
    }
}
