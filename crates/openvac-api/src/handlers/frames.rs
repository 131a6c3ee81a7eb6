//! Frame artifact retrieval.

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use openvac_models::{FrameTier, JobId};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn parse_job_id(raw: &str) -> ApiResult<JobId> {
    JobId::parse(raw).map_err(|e| ApiError::bad_request(e.to_string()))
}

fn parse_tier(raw: &str) -> ApiResult<FrameTier> {
    raw.parse().map_err(ApiError::bad_request)
}

/// GET /api/frames/:job_id/:tier/:file
pub async fn get_frame(
    State(state): State<AppState>,
    Path((job_id, tier, file)): Path<(String, String, String)>,
) -> ApiResult<impl IntoResponse> {
    let job_id = parse_job_id(&job_id)?;
    let tier = parse_tier(&tier)?;

    let frame = state
        .frames
        .read_file(&job_id, tier, &file)
        .await?
        .ok_or_else(|| {
            debug!(job_id = %job_id, tier = %tier, file = %file, "Frame not found");
            ApiError::not_found("Frame not found")
        })?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        frame.text,
    ))
}

#[derive(Debug, Deserialize)]
pub struct TierQuery {
    pub tier: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JobFramesResponse {
    pub tier: Option<FrameTier>,
    pub frames: Vec<String>,
}

/// GET /api/jobs/:job_id/frames?tier=<tier>
///
/// Returns the requested tier when it has frames, otherwise the best
/// available one (medium, low, high).
pub async fn get_job_frames(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<TierQuery>,
) -> ApiResult<Json<JobFramesResponse>> {
    let job_id = parse_job_id(&job_id)?;
    let requested = query
        .tier
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(parse_tier)
        .transpose()?;

    if !state.frames.job_exists(&job_id).await {
        return Err(ApiError::not_found(format!("Job not found: {}", job_id)));
    }

    let response = match state.frames.best_available(&job_id, requested).await? {
        Some((tier, frames)) => JobFramesResponse {
            tier: Some(tier),
            frames,
        },
        None => JobFramesResponse {
            tier: None,
            frames: Vec::new(),
        },
    };

    Ok(Json(response))
}
