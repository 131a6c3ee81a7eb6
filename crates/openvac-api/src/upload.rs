//! Multipart upload intake.
//!
//! Both conversion endpoints take the same form: a `video` file part plus
//! optional `fps`, `aspect`, `threshold` and `motion` text parts. The video
//! is streamed chunk by chunk into the workspace; it never sits in memory
//! whole.

use std::path::{Path, PathBuf};

use axum::extract::multipart::Field;
use axum::extract::Multipart;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use openvac_media::{MediaError, ScopedWorkspace};
use openvac_models::ConversionSettings;

use crate::error::{ApiError, ApiResult};
use crate::metrics;

/// Message returned when the form carries no usable video.
pub const MISSING_VIDEO_MESSAGE: &str = "No video file provided";

/// A received upload, already on disk.
#[derive(Debug)]
pub struct Upload {
    /// Workspace holding the input (still guarded)
    pub workspace: ScopedWorkspace,
    /// Uploaded video inside the workspace
    pub input: PathBuf,
    /// Upload size in bytes
    pub size: u64,
    pub settings: ConversionSettings,
}

#[derive(Default)]
struct FormFields {
    video: Option<(PathBuf, u64)>,
    fps: Option<String>,
    aspect: Option<String>,
    threshold: Option<String>,
    motion: Option<String>,
}

/// Read the form into `workspace`.
///
/// On any error the workspace is destroyed before returning.
pub async fn receive_upload(multipart: Multipart, workspace: ScopedWorkspace) -> ApiResult<Upload> {
    let fields = match read_form(multipart, &workspace).await {
        Ok(fields) => fields,
        Err(e) => {
            if let Err(cleanup) = workspace.destroy().await {
                warn!("Failed to destroy rejected upload workspace: {}", cleanup);
            }
            return Err(e);
        }
    };

    let Some((input, size)) = fields.video else {
        if let Err(cleanup) = workspace.destroy().await {
            warn!("Failed to destroy rejected upload workspace: {}", cleanup);
        }
        return Err(ApiError::bad_request(MISSING_VIDEO_MESSAGE));
    };

    metrics::record_upload_bytes(size);

    let settings = ConversionSettings::from_form(
        fields.fps.as_deref(),
        fields.aspect.as_deref(),
        fields.threshold.as_deref(),
        fields.motion.as_deref(),
    );

    Ok(Upload {
        workspace,
        input,
        size,
        settings,
    })
}

async fn read_form(mut multipart: Multipart, workspace: &ScopedWorkspace) -> ApiResult<FormFields> {
    let mut fields = FormFields::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "video" if fields.video.is_none() => {
                let path = workspace.input_path(field.file_name());
                let size = write_field(field, &path).await?;
                if size > 0 {
                    fields.video = Some((path, size));
                } else {
                    debug!("Ignoring empty video part");
                }
            }
            "fps" => fields.fps = Some(field.text().await?),
            "aspect" => fields.aspect = Some(field.text().await?),
            "threshold" => fields.threshold = Some(field.text().await?),
            "motion" => fields.motion = Some(field.text().await?),
            other => debug!(field = other, "Ignoring form field"),
        }
    }

    Ok(fields)
}

async fn write_field(mut field: Field<'_>, path: &Path) -> ApiResult<u64> {
    let mut file = File::create(path).await.map_err(MediaError::from)?;
    let mut size = 0u64;

    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk).await.map_err(MediaError::from)?;
        size += chunk.len() as u64;
    }
    file.flush().await.map_err(MediaError::from)?;

    Ok(size)
}
