//! API error types.

use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use openvac_media::MediaError;

pub type ApiResult<T> = Result<T, ApiError>;

static HIDE_INTERNAL_ERRORS: AtomicBool = AtomicBool::new(false);

/// Hide internal error details from response bodies (set from `ApiConfig`).
pub fn set_hide_internal_errors(hide: bool) {
    HIDE_INTERNAL_ERRORS.store(hide, Ordering::Relaxed);
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),

    #[error("Invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error(transparent)]
    Media(#[from] MediaError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Multipart(e) => e.status(),
            ApiError::Media(MediaError::InvalidFrameName(_)) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) | ApiError::Media(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message sent to the client.
    fn public_message(&self, hide_internal: bool) -> String {
        if hide_internal && self.is_internal() {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        }
    }

    /// Whether the message may leak server internals.
    fn is_internal(&self) -> bool {
        matches!(
            self,
            ApiError::Internal(_)
                | ApiError::Media(MediaError::Io(_))
                | ApiError::Media(MediaError::JsonParse(_))
        )
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "Request failed: {}", self);
        }

        // Don't expose internal error details in production
        let error = self.public_message(HIDE_INTERNAL_ERRORS.load(Ordering::Relaxed));

        (status, Json(ErrorResponse { error })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::bad_request("No video file provided").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::not_found("Frame not found").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(MediaError::InvalidFrameName("x".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(MediaError::ConversionFailed("boom".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_message_is_not_prefixed() {
        assert_eq!(
            ApiError::bad_request("No video file provided").to_string(),
            "No video file provided"
        );
        assert_eq!(
            ApiError::from(MediaError::invalid_video("could not determine video duration"))
                .to_string(),
            "Invalid video file: could not determine video duration"
        );
    }

    #[test]
    fn test_internal_details_hidden_when_requested() {
        let err = ApiError::internal("disk layout at /var/tmp/openvac");
        assert_eq!(err.public_message(true), "An internal error occurred");
        assert_eq!(err.public_message(false), "disk layout at /var/tmp/openvac");

        let err = ApiError::bad_request("No video file provided");
        assert_eq!(err.public_message(true), "No video file provided");
    }
}
