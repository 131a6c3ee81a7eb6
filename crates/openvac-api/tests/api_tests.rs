//! Router-level tests with a shell-script conversion tool and a fake clip source.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use openvac_api::{create_router, ApiConfig, AppState};
use openvac_media::{ClipSource, ClipWindow, MediaError, MediaResult};
use openvac_models::{JobId, SseDecoder, StreamOutcome};

const BOUNDARY: &str = "openvac-test-boundary";

/// Fake tool: fails with code 4 when the input contains `FAIL`.
const TOOL_SCRIPT: &str = r#"
input=""
out=""
for a in "$@"; do
  case "$a" in
    */input.*|*/clip.mp4) input="$a" ;;
  esac
done
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    -c) shift ;;
    *) shift 2 ;;
  esac
done
if grep -q FAIL "$input" 2>/dev/null; then
  echo "cannot decode input" >&2
  exit 4
fi
echo "Extracted 3 frames"
mkdir -p "$out/medium" "$out/high"
for i in 1 2 3; do
  printf "medium $i" > "$out/medium/frame_00$i.txt"
  echo "Converting frame $i/3"
done
printf "high 1" > "$out/high/frame_001.txt"
"#;

/// Clip source that copies the input; fails the probe for inputs containing "NOPROBE".
struct FakeClipSource;

#[async_trait]
impl ClipSource for FakeClipSource {
    async fn probe_duration(&self, input: &Path) -> MediaResult<f64> {
        let bytes = tokio::fs::read(input).await?;
        if bytes.windows(7).any(|w| w == b"NOPROBE") {
            return Err(MediaError::invalid_video("could not determine video duration"));
        }
        Ok(20.0)
    }

    async fn extract_clip(&self, input: &Path, _window: ClipWindow, output: &Path) -> MediaResult<()> {
        tokio::fs::copy(input, output).await?;
        Ok(())
    }
}

struct TestApp {
    dir: TempDir,
    router: Router,
}

impl TestApp {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("tool.sh");
        std::fs::write(&script, TOOL_SCRIPT).unwrap();

        let config = ApiConfig {
            scratch_dir: dir.path().join("scratch"),
            tool_program: "sh".to_string(),
            tool_script: Some(script.to_string_lossy().to_string()),
            enable_reaper: false,
            metrics_enabled: false,
            ..ApiConfig::default()
        };

        let state = AppState::with_clip_source(config, Arc::new(FakeClipSource))
            .await
            .unwrap();
        Self {
            dir,
            router: create_router(state, None),
        }
    }

    fn scratch(&self) -> std::path::PathBuf {
        self.dir.path().join("scratch")
    }

    fn workspaces_with_prefix(&self, prefix: &str) -> usize {
        std::fs::read_dir(self.scratch())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(prefix))
            .count()
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str) -> Response {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }
}

enum Part<'a> {
    File(&'a str, &'a str, &'a [u8]),
    Text(&'a str, &'a str),
}

fn multipart(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File(name, file_name, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: video/mp4\r\n\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}", name, value)
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

async fn stream_outcome(response: Response) -> StreamOutcome {
    let mut decoder = SseDecoder::new();
    decoder.push(&body_bytes(response).await);
    decoder.finish()
}

async fn convert(app: &TestApp, video: &[u8]) -> Response {
    app.send(multipart(
        "/api/convert",
        &[
            Part::File("video", "movie.mp4", video),
            Part::Text("fps", "12"),
            Part::Text("aspect", "2"),
        ],
    ))
    .await
}

#[tokio::test]
async fn test_convert_streams_progress_and_serves_frames() {
    let app = TestApp::new().await;

    let response = convert(&app, b"fake video").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let job_id = match stream_outcome(response).await {
        StreamOutcome::Completed {
            job_id,
            frame_count,
        } => {
            assert_eq!(frame_count, 3);
            job_id
        }
        other => panic!("expected completion, got {:?}", other),
    };

    let response = app
        .get(&format!("/api/frames/{}/medium/frame_001.txt", job_id))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"medium 1");

    let response = app
        .get(&format!("/api/frames/{}/medium/frame_004.txt", job_id))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // A frame written past a gap is not served
    let medium_dir = app
        .scratch()
        .join(format!("job-{}", job_id))
        .join("frames")
        .join("medium");
    std::fs::write(medium_dir.join("frame_005.txt"), "medium 5").unwrap();
    let response = app
        .get(&format!("/api/frames/{}/medium/frame_005.txt", job_id))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.get(&format!("/api/jobs/{}/frames", job_id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["tier"], "medium");
    assert_eq!(json["frames"].as_array().unwrap().len(), 3);

    let response = app
        .get(&format!("/api/jobs/{}/frames?tier=high", job_id))
        .await;
    let json = body_json(response).await;
    assert_eq!(json["tier"], "high");
    assert_eq!(json["frames"], serde_json::json!(["high 1"]));

    let response = app
        .send(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/jobs/{}", job_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .get(&format!("/api/frames/{}/medium/frame_001.txt", job_id))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.workspaces_with_prefix("job-"), 0);
}

#[tokio::test]
async fn test_convert_tool_failure_is_terminal_error() {
    let app = TestApp::new().await;

    let response = convert(&app, b"FAIL").await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        stream_outcome(response).await,
        StreamOutcome::Failed {
            message: "conversion tool exited with code 4".to_string()
        }
    );
}

#[tokio::test]
async fn test_convert_without_video_is_bad_request() {
    let app = TestApp::new().await;

    let response = app
        .send(multipart("/api/convert", &[Part::Text("fps", "15")]))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"error": "No video file provided"})
    );
    assert_eq!(app.workspaces_with_prefix("job-"), 0);
}

#[tokio::test]
async fn test_preview_returns_tiers_and_cleans_up() {
    let app = TestApp::new().await;

    let response = app
        .send(multipart(
            "/api/preview",
            &[Part::File("video", "movie.mov", b"fake video")],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let frames = json["frames"].as_object().unwrap();
    assert_eq!(frames.len(), 2);
    assert_eq!(
        frames["medium"],
        serde_json::json!(["medium 1", "medium 2", "medium 3"])
    );
    assert_eq!(frames["high"], serde_json::json!(["high 1"]));
    assert!(frames.get("low").is_none());

    assert_eq!(app.workspaces_with_prefix("preview-"), 0);
}

#[tokio::test]
async fn test_preview_probe_failure_is_server_error() {
    let app = TestApp::new().await;

    let response = app
        .send(multipart(
            "/api/preview",
            &[Part::File("video", "movie.mp4", b"NOPROBE")],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let json = body_json(response).await;
    assert!(json["error"]
        .as_str()
        .unwrap()
        .contains("could not determine video duration"));
    assert_eq!(app.workspaces_with_prefix("preview-"), 0);
}

#[tokio::test]
async fn test_preview_without_video_is_bad_request() {
    let app = TestApp::new().await;

    let response = app
        .send(multipart("/api/preview", &[Part::Text("fps", "15")]))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.workspaces_with_prefix("preview-"), 0);
}

#[tokio::test]
async fn test_frame_lookup_validation() {
    let app = TestApp::new().await;
    let job_id = JobId::new();

    let response = app.get("/api/frames/not-a-uuid/medium/frame_001.txt").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .get(&format!("/api/frames/{}/ultra/frame_001.txt", job_id))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .get(&format!("/api/frames/{}/medium/frame_1.txt", job_id))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .get(&format!("/api/frames/{}/medium/frame_001.txt", job_id))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.get(&format!("/api/jobs/{}/frames", job_id)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_unknown_job_is_idempotent() {
    let app = TestApp::new().await;

    let response = app
        .send(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/jobs/{}", JobId::new()))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;

    let response = app.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(body_json(response).await["status"], "healthy");
}
