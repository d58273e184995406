//! Provider Frame Decoder
//!
//! Turns the raw byte chunks of a provider's streaming response into an ordered
//! sequence of text fragments. Chunks may split a frame at any byte offset; the
//! decoder carries the unterminated tail over to the next chunk.
//!
//! Frames are one JSON document per line, optionally carrying an SSE `data:`
//! prefix. The stream is untrusted: lines that fail to parse, or that parse to
//! an unexpected shape, are skipped without interrupting the stream.

use futures::{Stream, StreamExt, stream};
use serde_json::Value;
use std::collections::VecDeque;
use tracing::debug;

/// Where the text pieces live inside a provider frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameShape {
    /// `candidates[0].content.parts[*].text`
    Gemini,
    /// `choices[0].delta.content`
    OpenAICompatible,
}

impl FrameShape {
    /// Extracts the non-empty text pieces of one parsed frame, in order.
    pub fn text_pieces(&self, frame: &Value) -> Vec<String> {
        match self {
            FrameShape::Gemini => frame
                .get("candidates")
                .and_then(|c| c.get(0))
                .and_then(|c| c.pointer("/content/parts"))
                .and_then(Value::as_array)
                .map(|parts| {
                    parts
                        .iter()
                        .filter_map(|part| part.get("text").and_then(Value::as_str))
                        .filter(|text| !text.is_empty())
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default(),
            FrameShape::OpenAICompatible => frame
                .pointer("/choices/0/delta/content")
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
                .map(|text| vec![text.to_owned()])
                .unwrap_or_default(),
        }
    }
}

/// Incremental line-oriented frame decoder.
#[derive(Debug)]
pub struct FrameDecoder {
    shape: FrameShape,
    carry: Vec<u8>,
    skipped: usize,
}

impl FrameDecoder {
    pub fn new(shape: FrameShape) -> Self {
        Self {
            shape,
            carry: Vec::new(),
            skipped: 0,
        }
    }

    /// Feeds one raw chunk and returns the fragments of every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(chunk);

        // 0x0A never occurs inside a multi-byte UTF-8 sequence, so splitting on
        // it before decoding keeps split codepoints intact in the carry.
        let Some(last_newline) = self.carry.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let complete: Vec<u8> = self.carry.drain(..=last_newline).collect();

        let mut fragments = Vec::new();
        for line in complete.split(|b| *b == b'\n') {
            self.decode_line(line, &mut fragments);
        }
        fragments
    }

    /// Flushes the unterminated tail once the upstream has ended normally.
    pub fn finish(&mut self) -> Vec<String> {
        let tail = std::mem::take(&mut self.carry);
        let mut fragments = Vec::new();
        self.decode_line(&tail, &mut fragments);
        fragments
    }

    /// Number of non-empty lines dropped because they were not usable frames.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn decode_line(&mut self, raw: &[u8], out: &mut Vec<String>) {
        let text = String::from_utf8_lossy(raw);
        let mut line = text.trim();
        if let Some(rest) = line.strip_prefix("data:") {
            line = rest.trim();
        }
        if line.is_empty() {
            return;
        }

        match serde_json::from_str::<Value>(line) {
            Ok(frame) => out.extend(self.shape.text_pieces(&frame)),
            Err(e) => {
                self.skipped += 1;
                debug!(error = %e, line_len = line.len(), "Skipping malformed upstream frame");
            }
        }
    }
}

struct DecodeState<S> {
    chunks: S,
    decoder: FrameDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

/// Lazily decodes a byte-chunk stream into a fragment stream.
///
/// A transport error from `chunks` is yielded once, after every fragment
/// decoded before it, and ends the stream.
pub fn decode_stream<S, B, E>(chunks: S, shape: FrameShape) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    let state = DecodeState {
        chunks,
        decoder: FrameDecoder::new(shape),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(fragment) = st.pending.pop_front() {
                return Some((Ok(fragment), st));
            }
            if st.finished {
                return None;
            }
            match st.chunks.next().await {
                Some(Ok(chunk)) => st.pending.extend(st.decoder.push(chunk.as_ref())),
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e), st));
                }
                None => {
                    st.finished = true;
                    st.pending.extend(st.decoder.finish());
                    if st.decoder.skipped() > 0 {
                        debug!(skipped = st.decoder.skipped(), "Upstream stream ended with skipped frames");
                    }
                }
            }
        }
    })
}
