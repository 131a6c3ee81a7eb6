//! Shared data models for the OpenVAC conversion service.
//!
//! This crate provides Serde-serializable types for:
//! - Conversion settings parsed from untrusted form input
//! - Job identifiers and job records
//! - Progress events and their server-sent-event wire framing
//! - Frame tiers, frame artifacts and the tier fallback policy

pub mod event;
pub mod job;
pub mod settings;
pub mod tier;
pub mod wire;

// Re-export common types
pub use event::ProgressEvent;
pub use job::{Job, JobId, JobIdError};
pub use settings::ConversionSettings;
pub use tier::{best_tier, FrameArtifact, FrameTier, TierCounts, FALLBACK_ORDER};
pub use wire::{encode_event, SseDecoder, StreamOutcome};
