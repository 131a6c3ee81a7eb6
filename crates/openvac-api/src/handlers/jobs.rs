//! Job workspace management.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use tracing::info;

use openvac_media::destroy_workspace;
use openvac_models::JobId;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// DELETE /api/jobs/:job_id
///
/// Removes the job's workspace. Deleting a job that is already gone
/// succeeds.
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<StatusCode> {
    let job_id = JobId::parse(&job_id).map_err(|e| ApiError::bad_request(e.to_string()))?;

    destroy_workspace(&state.workspaces.job_root(&job_id)).await?;

    info!(job_id = %job_id, "Job workspace deleted");
    metrics::record_workspaces_reaped("explicit", 1);

    Ok(StatusCode::NO_CONTENT)
}
