//! Client-side Chunk Assembler
//!
//! Rebuilds the assistant's message from a `text/event-stream` body that may
//! arrive in arbitrary transport chunks, exposing the running text for live
//! display and freezing it exactly once when the turn ends.

use crate::event::{EventStreamDecoder, NormalizedEvent};
use futures::{Stream, StreamExt};
use std::fmt::Display;
use tracing::{debug, warn};

/// A change to the live text produced by one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblerUpdate {
    /// A fragment was appended to the running text.
    Appended(String),
    /// The terminal event arrived; the text is now frozen.
    Done,
}

/// How the event stream for a turn came to an end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The terminal event was received.
    Done,
    /// The transport ended before the terminal event.
    Ended,
    /// The transport failed before the terminal event.
    Failed(String),
}

/// The frozen text of one assistant reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage {
    pub text: String,
    pub termination: Termination,
}

impl AssembledMessage {
    /// Whether the reply ran to its terminal event rather than being cut short.
    pub fn is_complete(&self) -> bool {
        self.termination == Termination::Done
    }
}

#[derive(Debug, Default)]
pub struct ChunkAssembler {
    framing: EventStreamDecoder,
    text: String,
    done: bool,
    malformed: usize,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live partial text.
    pub fn partial(&self) -> &str {
        &self.text
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Number of event payloads skipped because they could not be decoded.
    pub fn malformed(&self) -> usize {
        self.malformed
    }

    /// Feeds one transport chunk; returns the updates of every event it completed.
    ///
    /// Nothing is applied once the terminal event has been seen.
    pub fn push_bytes(&mut self, chunk: &[u8]) -> Vec<AssemblerUpdate> {
        let mut updates = Vec::new();
        self.push_bytes_with(chunk, |update, _| updates.push(update.clone()));
        updates
    }

    /// Feeds one transport chunk, reporting each update as soon as its event
    /// is applied together with the running text at that point.
    pub fn push_bytes_with<F>(&mut self, chunk: &[u8], mut on_update: F)
    where
        F: FnMut(&AssemblerUpdate, &str),
    {
        if self.done {
            return;
        }
        for data in self.framing.push(chunk) {
            if let Some(update) = self.apply_data(&data) {
                on_update(&update, &self.text);
            }
            if self.done {
                break;
            }
        }
    }

    /// Applies an event left open by a missing final blank line.
    fn flush_tail<F>(&mut self, mut on_update: F)
    where
        F: FnMut(&AssemblerUpdate, &str),
    {
        if self.done {
            return;
        }
        if let Some(data) = self.framing.finish() {
            if let Some(update) = self.apply_data(&data) {
                on_update(&update, &self.text);
            }
        }
    }

    /// Applies one `data:` payload. Undecodable payloads are skipped.
    pub fn apply_data(&mut self, data: &str) -> Option<AssemblerUpdate> {
        match NormalizedEvent::from_data(data) {
            Ok(event) => self.apply(event),
            Err(e) => {
                self.malformed += 1;
                debug!(error = %e, "Skipping malformed relay event");
                None
            }
        }
    }

    pub fn apply(&mut self, event: NormalizedEvent) -> Option<AssemblerUpdate> {
        if self.done {
            return None;
        }
        match event {
            NormalizedEvent::Content(fragment) if fragment.is_empty() => None,
            NormalizedEvent::Content(fragment) => {
                self.text.push_str(&fragment);
                Some(AssemblerUpdate::Appended(fragment))
            }
            NormalizedEvent::Done => {
                self.done = true;
                Some(AssemblerUpdate::Done)
            }
        }
    }

    /// Freezes the text after the transport ended on its own.
    ///
    /// An event left open by a missing final blank line is still applied.
    pub fn finish(mut self) -> AssembledMessage {
        self.flush_tail(|_, _| {});
        let termination = if self.done {
            Termination::Done
        } else {
            Termination::Ended
        };
        self.freeze(termination)
    }

    /// Freezes whatever text accumulated before a transport failure.
    pub fn fail(self, reason: impl Into<String>) -> AssembledMessage {
        if self.done {
            return self.freeze(Termination::Done);
        }
        self.freeze(Termination::Failed(reason.into()))
    }

    fn freeze(self, termination: Termination) -> AssembledMessage {
        AssembledMessage {
            text: self.text,
            termination,
        }
    }
}

/// Drives a `ChunkAssembler` over a byte stream until the turn ends.
///
/// `on_update` sees every update together with the running text. Reading stops
/// at the terminal event; a transport error freezes the partial text.
pub async fn assemble_stream<S, B, E, F>(mut chunks: S, mut on_update: F) -> AssembledMessage
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
    F: FnMut(&AssemblerUpdate, &str),
{
    let mut assembler = ChunkAssembler::new();
    while let Some(chunk) = chunks.next().await {
        match chunk {
            Ok(bytes) => {
                assembler.push_bytes_with(bytes.as_ref(), &mut on_update);
                if assembler.is_done() {
                    return assembler.finish();
                }
            }
            Err(e) => {
                warn!(error = %e, received = assembler.partial().len(), "Event stream failed before completion");
                return assembler.fail(e.to_string());
            }
        }
    }

    assembler.flush_tail(&mut on_update);
    let message = assembler.finish();
    if let Termination::Done = message.termination {
        return message;
    }
    warn!("Event stream ended without a terminal event");
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use futures::stream;

    fn wire(events: &[NormalizedEvent]) -> Vec<u8> {
        events.iter().map(NormalizedEvent::to_wire).collect::<String>().into_bytes()
    }

    fn greeting() -> Vec<NormalizedEvent> {
        vec![
            NormalizedEvent::content("Olá"),
            NormalizedEvent::content(" tudo bem?"),
            NormalizedEvent::Done,
        ]
    }

    #[test]
    fn test_concatenates_content_in_order_regardless_of_chunking() {
        let bytes = wire(&greeting());
        for size in 1..=bytes.len() {
            let mut assembler = ChunkAssembler::new();
            let mut done_count = 0;
            for chunk in bytes.chunks(size) {
                done_count += assembler
                    .push_bytes(chunk)
                    .iter()
                    .filter(|u| **u == AssemblerUpdate::Done)
                    .count();
            }
            assert_eq!(done_count, 1, "chunk size {size}");
            let message = assembler.finish();
            assert_eq!(message.text, "Olá tudo bem?");
            assert!(message.is_complete());
        }
    }

    #[test]
    fn test_live_text_grows_then_freezes() {
        let bytes = wire(&greeting());
        let mut seen = Vec::new();
        let message = block_on(assemble_stream(
            stream::iter(bytes.chunks(5).map(|c| Ok::<_, String>(c.to_vec()))),
            |update, text| {
                if let AssemblerUpdate::Appended(_) = update {
                    seen.push(text.to_string());
                }
            },
        ));
        assert_eq!(seen, vec!["Olá", "Olá tudo bem?"]);
        assert_eq!(message.text, "Olá tudo bem?");
        assert_eq!(message.termination, Termination::Done);
    }

    #[test]
    fn test_live_text_per_event_when_one_chunk_carries_the_whole_reply() {
        let chunks = vec![Ok::<_, String>(wire(&greeting()))];
        let mut seen = Vec::new();
        let mut done = 0;
        let message = block_on(assemble_stream(stream::iter(chunks), |update, text| {
            match update {
                AssemblerUpdate::Appended(_) => seen.push(text.to_string()),
                AssemblerUpdate::Done => done += 1,
            }
        }));
        assert_eq!(seen, vec!["Olá", "Olá tudo bem?"]);
        assert_eq!(done, 1);
        assert_eq!(message.text, "Olá tudo bem?");
    }

    #[test]
    fn test_unterminated_last_event_still_reaches_live_text() {
        let body = b"data: {\"content\":\"a\"}\n\ndata: {\"content\":\"b\"}";
        let chunks = vec![Ok::<_, String>(body.to_vec())];
        let mut seen = Vec::new();
        let message = block_on(assemble_stream(stream::iter(chunks), |_, text| {
            seen.push(text.to_string())
        }));
        assert_eq!(seen, vec!["a", "ab"]);
        assert_eq!(message.termination, Termination::Ended);
    }

    #[test]
    fn test_malformed_events_are_skipped() {
        let mut bytes = wire(&[NormalizedEvent::content("a")]);
        bytes.extend_from_slice(b"data: {\"content\": \n\ndata: {\"other\": 1}\n\n");
        bytes.extend(wire(&[NormalizedEvent::content("b"), NormalizedEvent::Done]));

        let mut assembler = ChunkAssembler::new();
        assembler.push_bytes(&bytes);
        assert_eq!(assembler.malformed(), 2);
        assert_eq!(assembler.finish().text, "ab");
    }

    #[test]
    fn test_events_after_done_are_ignored() {
        let mut assembler = ChunkAssembler::new();
        assert_eq!(
            assembler.apply(NormalizedEvent::content("x")),
            Some(AssemblerUpdate::Appended("x".to_string()))
        );
        assert_eq!(assembler.apply(NormalizedEvent::content("")), None);
        assert_eq!(assembler.apply(NormalizedEvent::Done), Some(AssemblerUpdate::Done));
        assert_eq!(assembler.apply(NormalizedEvent::Done), None);
        assert_eq!(assembler.apply(NormalizedEvent::content("late")), None);
        assert_eq!(assembler.partial(), "x");
    }

    #[test]
    fn test_transport_failure_keeps_partial_text() {
        let chunks = vec![
            Ok(wire(&[NormalizedEvent::content("meio")])),
            Err("connection reset".to_string()),
        ];
        let message = block_on(assemble_stream(stream::iter(chunks), |_, _| {}));
        assert_eq!(message.text, "meio");
        assert_eq!(
            message.termination,
            Termination::Failed("connection reset".to_string())
        );
        assert!(!message.is_complete());
    }

    #[test]
    fn test_stream_ending_without_terminal_event() {
        let chunks = vec![Ok::<_, String>(wire(&[NormalizedEvent::content("sem fim")]))];
        let message = block_on(assemble_stream(stream::iter(chunks), |_, _| {}));
        assert_eq!(message.text, "sem fim");
        assert_eq!(message.termination, Termination::Ended);
    }

    #[test]
    fn test_terminal_event_without_trailing_blank_line() {
        let chunks = vec![Ok::<_, String>(b"data: {\"content\":\"x\"}\n\ndata: [DONE]".to_vec())];
        let message = block_on(assemble_stream(stream::iter(chunks), |_, _| {}));
        assert_eq!(message.text, "x");
        assert!(message.is_complete());
    }
}
