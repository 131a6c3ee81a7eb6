//! Ten-frame preview sampling.
//!
//! A preview converts a short clip cut from the middle of the source in a
//! disposable workspace, then returns every non-empty tier in one response.
//! The workspace is gone by the time [`PreviewSampler::sample`] returns,
//! whatever the outcome.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use openvac_models::{ConversionSettings, JobId};

use crate::clip::{ClipSource, ClipWindow};
use crate::error::{MediaError, MediaResult};
use crate::frames::{load_tiers, TierFrames};
use crate::orchestrator::{ConversionOrchestrator, ConversionRequest};
use crate::workspace::{ScopedWorkspace, WorkspaceFactory, PREVIEW_PREFIX};

/// File name of the extracted clip inside the preview workspace.
pub const CLIP_FILE_NAME: &str = "clip.mp4";

/// Default ceiling for one whole preview: probe, extraction and conversion.
pub const DEFAULT_PREVIEW_TIMEOUT: Duration = Duration::from_secs(60);

/// Produces previews from uploaded videos.
#[derive(Clone)]
pub struct PreviewSampler {
    factory: WorkspaceFactory,
    orchestrator: ConversionOrchestrator,
    clip_source: Arc<dyn ClipSource>,
    timeout: Duration,
}

impl std::fmt::Debug for PreviewSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewSampler")
            .field("factory", &self.factory)
            .field("orchestrator", &self.orchestrator)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl PreviewSampler {
    pub fn new(
        factory: WorkspaceFactory,
        orchestrator: ConversionOrchestrator,
        clip_source: Arc<dyn ClipSource>,
    ) -> Self {
        Self {
            factory,
            orchestrator,
            clip_source,
            timeout: DEFAULT_PREVIEW_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Allocate a disposable preview workspace for an upload.
    pub async fn create_workspace(&self) -> MediaResult<ScopedWorkspace> {
        self.factory.create_scoped(PREVIEW_PREFIX).await
    }

    /// Sample, convert and read a preview, then destroy the workspace.
    ///
    /// The whole run is bounded by the sampler timeout. If the returned
    /// future is dropped midway, the guard removes the workspace and the
    /// orchestrator kills the tool.
    pub async fn sample(
        &self,
        workspace: ScopedWorkspace,
        input: &Path,
        settings: ConversionSettings,
    ) -> MediaResult<TierFrames> {
        let result = match tokio::time::timeout(
            self.timeout,
            self.sample_in(&workspace, input, settings),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(MediaError::Timeout(self.timeout.as_secs())),
        };

        if let Err(e) = workspace.destroy().await {
            warn!("Failed to destroy preview workspace: {}", e);
        }

        match &result {
            Ok(frames) => info!(tiers = frames.len(), "Preview ready"),
            Err(e) => warn!("Preview failed: {}", e),
        }
        result
    }

    async fn sample_in(
        &self,
        workspace: &ScopedWorkspace,
        input: &Path,
        settings: ConversionSettings,
    ) -> MediaResult<TierFrames> {
        let duration = self.clip_source.probe_duration(input).await?;
        let window = ClipWindow::for_duration(duration, settings.fps);
        debug!(
            source_duration = duration,
            start = window.start,
            clip_duration = window.duration,
            "Selected preview window"
        );

        let clip = workspace.file(CLIP_FILE_NAME);
        self.clip_source.extract_clip(input, window, &clip).await?;

        let request = ConversionRequest::new(
            JobId::new(),
            &clip,
            &workspace.frames_dir,
            settings,
        )
        .tiered(true)
        .with_timeout(self.timeout)
        .cancel_on_disconnect(true);

        self.orchestrator
            .run_to_completion(request)
            .await
            .into_result()?;

        load_tiers(&workspace.frames_dir).await
    }
}
