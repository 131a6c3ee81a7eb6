//! Background services.

pub mod reaper;

pub use reaper::WorkspaceReaper;
