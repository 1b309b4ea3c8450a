//! Server-Sent Events decoding.
//!
//! Converts a chunked HTTP body into a sequence of SSE frames:
//!
//! - bytes accumulate in a buffer and split into lines (`\n`, `\r`, `\r\n`)
//! - `data:` lines concatenate; an empty line emits the frame
//! - lines starting with `:` are comments; unknown fields are ignored
//! - a `data: [DONE]` frame is the end-of-stream sentinel
//!
//! Decoding stops at the frame layer here. JSON interpretation (and the
//! skip-and-continue policy for corrupt payloads) belongs to the adapter:
//! upstream gateways have been observed concatenating frames without
//! separators, and killing the stream over one bad frame loses all
//! accumulated progress.

use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use bytes::Bytes;
use futures::stream::Stream;

use crate::error::Result;
use crate::error::SdkError;

/// Maximum bytes of a bad payload quoted in diagnostics.
pub const PREVIEW_LIMIT: usize = 200;

/// Truncate a payload for diagnostics, at most [`PREVIEW_LIMIT`] bytes.
pub fn preview(payload: &str) -> String {
    if payload.len() <= PREVIEW_LIMIT {
        payload.to_string()
    } else {
        let mut end = PREVIEW_LIMIT;
        while !payload.is_char_boundary(end) {
            end -= 1;
        }
        payload[..end].to_string()
    }
}

/// A parsed SSE frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseFrame {
    /// Event type, from `event:`.
    pub event: Option<String>,
    /// Frame payload: `data:` lines joined with newlines.
    pub data: String,
}

impl SseFrame {
    /// Whether the frame carries a payload.
    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }

    /// Whether this is the `[DONE]` sentinel.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

/// Incremental SSE decoder.
///
/// Feed it lines (or byte chunks via [`decode_chunk`](Self::decode_chunk));
/// it emits a frame each time the event boundary (an empty line) is reached.
#[derive(Debug, Default)]
pub struct SseDecoder {
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Create a decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one line. Returns a frame when the boundary is reached.
    pub fn decode(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            if self.event.is_none() && self.data.is_empty() {
                return None;
            }
            let frame = SseFrame {
                event: self.event.take(),
                data: self.data.join("\n"),
            };
            self.data.clear();
            return Some(frame);
        }

        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.find(':') {
            Some(pos) => {
                let value = &line[pos + 1..];
                (&line[..pos], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }

        None
    }

    /// Feed a byte chunk, carrying incomplete lines in `buffer` across calls.
    pub fn decode_chunk(&mut self, chunk: &[u8], buffer: &mut Vec<u8>) -> Vec<SseFrame> {
        buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(line_end) = find_line_end(buffer) {
            let line_bytes: Vec<u8> = buffer.drain(..line_end.end).collect();
            buffer.drain(..line_end.ending_len);

            if let Ok(line) = std::str::from_utf8(&line_bytes) {
                if let Some(frame) = self.decode(line) {
                    frames.push(frame);
                }
            }
        }

        frames
    }

    /// Flush any partially accumulated frame at end of input.
    pub fn finish(&mut self, buffer: &[u8]) -> Option<SseFrame> {
        if let Ok(remainder) = std::str::from_utf8(buffer) {
            if !remainder.is_empty() {
                self.decode(remainder);
            }
        }
        self.decode("")
    }
}

struct LineEnd {
    end: usize,
    ending_len: usize,
}

/// Find the next line terminator, handling `\n`, `\r`, and `\r\n`.
fn find_line_end(buffer: &[u8]) -> Option<LineEnd> {
    for (i, &byte) in buffer.iter().enumerate() {
        if byte == b'\n' {
            return Some(LineEnd {
                end: i,
                ending_len: 1,
            });
        }
        if byte == b'\r' {
            // A trailing \r might be half of \r\n; wait for the next chunk.
            if i + 1 == buffer.len() {
                return None;
            }
            let ending_len = if buffer[i + 1] == b'\n' { 2 } else { 1 };
            return Some(LineEnd { end: i, ending_len });
        }
    }
    None
}

type BoxedByteStream =
    Pin<Box<dyn Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send>>;

/// Byte stream to frame stream.
pub struct SseFrameStream {
    inner: BoxedByteStream,
    decoder: SseDecoder,
    buffer: Vec<u8>,
    pending: Vec<SseFrame>,
    finished: bool,
}

impl SseFrameStream {
    /// Wrap a response byte stream.
    pub fn new<S>(byte_stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
    {
        Self {
            inner: Box::pin(byte_stream),
            decoder: SseDecoder::new(),
            buffer: Vec::new(),
            pending: Vec::new(),
            finished: false,
        }
    }
}

impl Stream for SseFrameStream {
    type Item = Result<SseFrame>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if !self.pending.is_empty() {
                return Poll::Ready(Some(Ok(self.pending.remove(0))));
            }
            if self.finished {
                return Poll::Ready(None);
            }

            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let mut buffer = std::mem::take(&mut self.buffer);
                    let frames = self.decoder.decode_chunk(&bytes, &mut buffer);
                    self.buffer = buffer;
                    self.pending.extend(frames);
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(SdkError::NetworkError(e.to_string()))));
                }
                Poll::Ready(None) => {
                    self.finished = true;
                    let buffer = std::mem::take(&mut self.buffer);
                    if let Some(frame) = self.decoder.finish(&buffer) {
                        self.pending.push(frame);
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
#[path = "sse.test.rs"]
mod tests;
