//! Application state.

use std::sync::Arc;

use openvac_media::{
    ClipSource, ConversionOrchestrator, FfmpegClipSource, FrameStore, PreviewSampler,
    WorkspaceFactory,
};

use crate::config::ApiConfig;
use crate::error::set_hide_internal_errors;

/// Shared application state.
///
/// Everything in here is immutable; jobs only share this.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub workspaces: WorkspaceFactory,
    pub orchestrator: ConversionOrchestrator,
    pub previews: PreviewSampler,
    pub frames: FrameStore,
}

impl AppState {
    /// Create application state backed by ffprobe/ffmpeg.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let clip_source = FfmpegClipSource::new().with_timeout(config.preview_timeout);
        Self::with_clip_source(config, Arc::new(clip_source)).await
    }

    /// Create application state with a custom preview clip source.
    pub async fn with_clip_source(
        config: ApiConfig,
        clip_source: Arc<dyn ClipSource>,
    ) -> anyhow::Result<Self> {
        set_hide_internal_errors(config.is_production());

        let workspaces = WorkspaceFactory::new(&config.scratch_dir);
        workspaces.ensure_root().await?;

        let orchestrator = ConversionOrchestrator::new(config.tool_config());
        let previews = PreviewSampler::new(workspaces.clone(), orchestrator.clone(), clip_source)
            .with_timeout(config.preview_timeout);
        let frames = FrameStore::new(workspaces.clone());

        Ok(Self {
            config,
            workspaces,
            orchestrator,
            previews,
            frames,
        })
    }
}
