//! Health check handlers.

use std::path::Path;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use openvac_media::{check_ffmpeg, check_ffprobe};

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub scratch: CheckStatus,
    pub tool: CheckStatus,
    pub ffmpeg: CheckStatus,
    pub ffprobe: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(msg.into()),
        }
    }

    fn from_result<T, E: std::fmt::Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(e) => Self::error(e.to_string()),
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Readiness check endpoint (readiness probe).
/// Checks the scratch directory and the external programs.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let scratch = check_scratch_writable(state.workspaces.root()).await;

    let tool = match state.orchestrator.tool().check() {
        Ok(_) => match &state.config.tool_script {
            Some(script) if !Path::new(script).exists() => {
                CheckStatus::error(format!("Conversion script not found: {}", script))
            }
            _ => CheckStatus::ok(),
        },
        Err(e) => CheckStatus::error(e.to_string()),
    };

    let ffmpeg = CheckStatus::from_result(check_ffmpeg());
    let ffprobe = CheckStatus::from_result(check_ffprobe());

    let all_ok = scratch.is_ok() && tool.is_ok() && ffmpeg.is_ok() && ffprobe.is_ok();

    let response = ReadinessResponse {
        status: if all_ok { "ready" } else { "degraded" }.to_string(),
        checks: ReadinessChecks {
            scratch,
            tool,
            ffmpeg,
            ffprobe,
        },
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

async fn check_scratch_writable(root: &Path) -> CheckStatus {
    let probe = root.join(format!(".ready-{}", Uuid::new_v4()));
    match tokio::fs::write(&probe, b"ok").await {
        Ok(()) => {
            tokio::fs::remove_file(&probe).await.ok();
            CheckStatus::ok()
        }
        Err(e) => CheckStatus::error(format!("Scratch directory not writable: {}", e)),
    }
}
