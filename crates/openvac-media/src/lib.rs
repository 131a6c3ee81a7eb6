#![deny(unreachable_patterns)]
//! Conversion pipeline for OpenVAC.
//!
//! This crate provides:
//! - Per-job scratch workspaces with guaranteed cleanup
//! - Orchestration of the external conversion tool with streamed progress
//! - Midpoint preview sampling through ffprobe/ffmpeg
//! - Tiered frame artifact storage with best-tier fallback

pub mod clip;
pub mod command;
pub mod error;
pub mod frames;
pub mod orchestrator;
pub mod preview;
pub mod probe;
pub mod scanner;
pub mod workspace;

pub use clip::{ClipSource, ClipWindow, FfmpegClipSource, PREVIEW_FRAME_COUNT};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner, ToolCommand, ToolConfig};
pub use error::{MediaError, MediaResult};
pub use frames::{
    inspect_tier, list_tier, load_tiers, read_frame, FrameStore, TierCompleteness, TierFrames,
};
pub use orchestrator::{
    CompletionHook, ConversionMachine, ConversionOrchestrator, ConversionOutcome, ConversionRequest,
    ConversionStream, MachineState, Transition,
};
pub use preview::PreviewSampler;
pub use probe::probe_duration;
pub use scanner::{LineScanner, MarkerScanner, ScannedLine};
pub use workspace::{
    destroy_workspace, ScopedWorkspace, Workspace, WorkspaceFactory, JOB_PREFIX, PREVIEW_PREFIX,
};
