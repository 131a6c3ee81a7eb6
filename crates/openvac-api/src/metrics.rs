//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex::Regex;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "openvac_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "openvac_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "openvac_http_requests_in_flight";

    // Conversion metrics
    pub const CONVERSIONS_STARTED_TOTAL: &str = "openvac_conversions_started_total";
    pub const CONVERSIONS_FINISHED_TOTAL: &str = "openvac_conversions_finished_total";
    pub const CONVERSION_FRAMES: &str = "openvac_conversion_frames";
    pub const UPLOAD_BYTES: &str = "openvac_upload_bytes";

    // Preview metrics
    pub const PREVIEWS_TOTAL: &str = "openvac_previews_total";
    pub const PREVIEW_DURATION_SECONDS: &str = "openvac_preview_duration_seconds";

    // Workspace metrics
    pub const WORKSPACES_REAPED_TOTAL: &str = "openvac_workspaces_reaped_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a conversion launch.
pub fn record_conversion_started() {
    counter!(names::CONVERSIONS_STARTED_TOTAL).increment(1);
}

/// Record a conversion's terminal event.
pub fn record_conversion_finished(succeeded: bool, frame_count: u64) {
    let labels = [("outcome", outcome(succeeded).to_string())];
    counter!(names::CONVERSIONS_FINISHED_TOTAL, &labels).increment(1);
    if succeeded {
        histogram!(names::CONVERSION_FRAMES).record(frame_count as f64);
    }
}

/// Record the size of a received upload.
pub fn record_upload_bytes(bytes: u64) {
    histogram!(names::UPLOAD_BYTES).record(bytes as f64);
}

/// Record a finished preview.
pub fn record_preview(succeeded: bool, duration_secs: f64) {
    let labels = [("outcome", outcome(succeeded).to_string())];
    counter!(names::PREVIEWS_TOTAL, &labels).increment(1);
    histogram!(names::PREVIEW_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record removed workspaces.
pub fn record_workspaces_reaped(reason: &str, count: usize) {
    let labels = [("reason", reason.to_string())];
    counter!(names::WORKSPACES_REAPED_TOTAL, &labels).increment(count as u64);
}

fn outcome(succeeded: bool) -> &'static str {
    if succeeded {
        "succeeded"
    } else {
        "failed"
    }
}

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .expect("valid regex")
});

static FRAME_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/frame_[0-9]+\.txt$").expect("valid regex"));

/// Sanitize path for metrics labels (remove IDs, etc.).
fn sanitize_path(path: &str) -> String {
    let path = UUID_RE.replace_all(path, ":id");
    FRAME_FILE_RE.replace_all(&path, "/:file").to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
