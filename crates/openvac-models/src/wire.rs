//! Server-sent-event framing for progress streams.
//!
//! Each event travels as one record: `data: <json>` followed by a blank
//! line. Readers split on the double newline and keep any trailing partial
//! record until more bytes arrive.

use tracing::debug;

use crate::{JobId, ProgressEvent};

/// Prefix of a data record.
pub const DATA_PREFIX: &str = "data: ";

/// Record separator.
pub const RECORD_SEPARATOR: &[u8] = b"\n\n";

/// Frame a single event as an SSE record.
pub fn encode_event(event: &ProgressEvent) -> String {
    // Serializing a tagged enum of strings and integers cannot fail.
    let json = serde_json::to_string(event).unwrap_or_default();
    format!("{DATA_PREFIX}{json}\n\n")
}

/// How a progress stream ended, as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// A `done` event was received
    Completed { job_id: JobId, frame_count: u64 },
    /// An `error` event was received
    Failed { message: String },
    /// The transport closed before any terminal event: outcome unknown
    Disconnected,
}

/// Incremental decoder for a progress stream.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    terminal: Option<ProgressEvent>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and return the events it completed.
    ///
    /// Events after a terminal event are dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ProgressEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = find_separator(&self.buffer) {
            let record: Vec<u8> = self.buffer.drain(..pos + RECORD_SEPARATOR.len()).collect();
            let record = &record[..pos];

            if self.terminal.is_some() {
                continue;
            }
            if let Some(event) = decode_record(record) {
                if event.is_terminal() {
                    self.terminal = Some(event.clone());
                }
                events.push(event);
            }
        }
        events
    }

    /// Bytes of an incomplete record still waiting for its separator.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Whether a terminal event has been decoded.
    pub fn is_finished(&self) -> bool {
        self.terminal.is_some()
    }

    /// Classify the stream once the transport has closed.
    pub fn finish(self) -> StreamOutcome {
        match self.terminal {
            Some(ProgressEvent::Done {
                job_id,
                frame_count,
            }) => StreamOutcome::Completed {
                job_id,
                frame_count,
            },
            Some(ProgressEvent::Error { message }) => StreamOutcome::Failed { message },
            _ => StreamOutcome::Disconnected,
        }
    }
}

fn find_separator(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(RECORD_SEPARATOR.len())
        .position(|w| w == RECORD_SEPARATOR)
}

fn decode_record(record: &[u8]) -> Option<ProgressEvent> {
    let text = std::str::from_utf8(record).ok()?;
    // Keep-alive comments and other fields carry no event.
    let payload = text.strip_prefix(DATA_PREFIX)?;
    match serde_json::from_str(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!("Skipping malformed progress record: {}", e);
            None
        }
    }
}
