//! Instant preview.

use std::time::Instant;

use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use tracing::{info, warn};

use openvac_media::TierFrames;

use crate::error::ApiResult;
use crate::metrics;
use crate::state::AppState;
use crate::upload::receive_upload;

/// Preview response: tier name to ordered frame texts, empty tiers omitted.
#[derive(Serialize)]
pub struct PreviewResponse {
    pub frames: TierFrames,
}

/// POST /api/preview
///
/// A client that abandons the request cancels the preview; the workspace
/// is removed and the tool killed either way.
pub async fn preview(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<PreviewResponse>> {
    let workspace = state.previews.create_workspace().await?;
    let upload = receive_upload(multipart, workspace).await?;

    let start = Instant::now();
    let result = state
        .previews
        .sample(upload.workspace, &upload.input, upload.settings)
        .await;
    let elapsed = start.elapsed().as_secs_f64();
    metrics::record_preview(result.is_ok(), elapsed);

    match &result {
        Ok(frames) => info!(tiers = frames.len(), elapsed_secs = elapsed, "Preview served"),
        Err(e) if e.is_source_error() => warn!("Preview rejected source video: {}", e),
        Err(_) => {}
    }

    Ok(Json(PreviewResponse { frames: result? }))
}
