//! Conversion progress events.
//!
//! A job emits an append-only sequence of these events. `Done` and `Error`
//! are terminal: at most one terminal event appears and it is always last.

use serde::{Deserialize, Serialize};

use crate::JobId;

/// Progress event envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Source frames extracted, rasterization about to start
    Extracting { total: u64 },

    /// Rasterization pass progress
    Progress { current: u64, total: u64 },

    /// Conversion finished successfully
    Done {
        #[serde(rename = "jobId")]
        job_id: JobId,
        #[serde(rename = "frameCount")]
        frame_count: u64,
    },

    /// Conversion failed
    Error { message: String },
}

impl ProgressEvent {
    /// Create an extracting event.
    pub fn extracting(total: u64) -> Self {
        ProgressEvent::Extracting { total }
    }

    /// Create a progress event.
    pub fn progress(current: u64, total: u64) -> Self {
        ProgressEvent::Progress { current, total }
    }

    /// Create a done event.
    pub fn done(job_id: JobId, frame_count: u64) -> Self {
        ProgressEvent::Done {
            job_id,
            frame_count,
        }
    }

    /// Create an error event.
    pub fn error(message: impl Into<String>) -> Self {
        ProgressEvent::Error {
            message: message.into(),
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Done { .. } | ProgressEvent::Error { .. })
    }
}
