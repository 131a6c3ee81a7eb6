//! Preview clip selection and extraction.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_duration;

/// Number of frames in a preview clip.
pub const PREVIEW_FRAME_COUNT: u32 = 10;

/// Time window of the preview clip within the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipWindow {
    /// Start offset in seconds
    pub start: f64,
    /// Clip length in seconds
    pub duration: f64,
    /// Output frame rate
    pub fps: f64,
}

impl ClipWindow {
    /// Center a [`PREVIEW_FRAME_COUNT`]-frame clip on the source midpoint.
    ///
    /// Sources shorter than the clip start at 0.
    pub fn for_duration(source_duration: f64, fps: f64) -> Self {
        let duration = f64::from(PREVIEW_FRAME_COUNT) / fps;
        let start = (source_duration / 2.0 - duration / 2.0).max(0.0);
        Self {
            start,
            duration,
            fps,
        }
    }
}

/// Where preview clips come from.
#[async_trait]
pub trait ClipSource: Send + Sync {
    /// Duration of the source video in seconds (always > 0).
    async fn probe_duration(&self, input: &Path) -> MediaResult<f64>;

    /// Write the clip covering `window` to `output`.
    async fn extract_clip(&self, input: &Path, window: ClipWindow, output: &Path)
        -> MediaResult<()>;
}

/// ffprobe/ffmpeg backed clip source.
#[derive(Debug, Clone, Default)]
pub struct FfmpegClipSource {
    timeout: Option<Duration>,
}

impl FfmpegClipSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill extraction if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl ClipSource for FfmpegClipSource {
    async fn probe_duration(&self, input: &Path) -> MediaResult<f64> {
        probe_duration(input).await
    }

    async fn extract_clip(
        &self,
        input: &Path,
        window: ClipWindow,
        output: &Path,
    ) -> MediaResult<()> {
        debug!(
            start = window.start,
            duration = window.duration,
            "Extracting preview clip"
        );

        let cmd = FfmpegCommand::new(input, output)
            .seek(window.start)
            .duration(window.duration)
            .frames(PREVIEW_FRAME_COUNT)
            .frame_rate(window.fps)
            .no_audio();

        let mut runner = FfmpegRunner::new();
        if let Some(timeout) = self.timeout {
            runner = runner.with_timeout(timeout);
        }
        runner.run(&cmd).await?;

        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg produced no preview clip",
                None,
                None,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_centered_on_midpoint() {
        let window = ClipWindow::for_duration(20.0, 15.0);
        assert!((window.duration - 10.0 / 15.0).abs() < 1e-9);
        assert!((window.start - (10.0 - 5.0 / 15.0)).abs() < 1e-9);
        assert_eq!(window.fps, 15.0);
    }

    #[test]
    fn test_short_source_starts_at_zero() {
        let window = ClipWindow::for_duration(0.4, 15.0);
        assert_eq!(window.start, 0.0);

        let window = ClipWindow::for_duration(1.0, 1.0);
        assert_eq!(window.duration, 10.0);
        assert_eq!(window.start, 0.0);
    }
}
