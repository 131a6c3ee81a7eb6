//! Full conversion with streamed progress.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Multipart, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use tracing::{info, warn};

use openvac_media::{ConversionOutcome, ConversionRequest, ScopedWorkspace};
use openvac_models::{Job, ProgressEvent};

use crate::error::ApiResult;
use crate::metrics;
use crate::state::AppState;
use crate::upload::receive_upload;

/// Keep-alive comment interval on the progress stream.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// POST /api/convert
///
/// Streams `data: <json>` records until the terminal `done` or `error`
/// event, then closes. The job workspace outlives the stream so frames can
/// be fetched afterwards.
pub async fn convert(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let (job_id, workspace) = state.workspaces.create_job_workspace().await?;
    let upload = receive_upload(multipart, ScopedWorkspace::new(workspace)).await?;
    let workspace = upload.workspace.persist();

    let job = Job::new(
        job_id,
        workspace.root,
        upload.input,
        workspace.frames_dir,
        upload.settings,
    );

    info!(
        job_id = %job.id,
        upload_bytes = upload.size,
        fps = job.settings.fps,
        "Starting conversion"
    );
    metrics::record_conversion_started();

    let request = ConversionRequest::new(
        job.id.clone(),
        &job.video_path,
        &job.frames_root,
        job.settings,
    )
    .tiered(true)
    .with_timeout(state.config.convert_timeout)
    .on_complete(|outcome| match outcome {
        ConversionOutcome::Succeeded { frame_count } => {
            metrics::record_conversion_finished(true, *frame_count)
        }
        ConversionOutcome::Failed { .. } => metrics::record_conversion_finished(false, 0),
    });

    let events = state
        .orchestrator
        .start(request)
        .map(|event| Ok(sse_event(&event)));

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    ))
}

/// One progress event as an SSE `data:` record.
fn sse_event(event: &ProgressEvent) -> Event {
    Event::default().json_data(event).unwrap_or_else(|e| {
        warn!("Failed to serialize progress event: {}", e);
        Event::default().comment("unserializable event")
    })
}
