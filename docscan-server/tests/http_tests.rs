// HTTP API tests driven through the router with tower's oneshot

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use docscan_core::{BoundingBox, DocscanConfig};
use docscan_eye::detector::ScriptedDetector;
use docscan_eye::source::MemorySource;
use docscan_eye::{CaptureError, FrameSource};
use docscan_server::{create_router, ApiState};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "docscan-test-boundary";

fn create_test_app(dir: &TempDir, detector: ScriptedDetector) -> Router {
    let mut config = DocscanConfig::default();
    config.batch.output_dir = dir.path().join("preds");
    config.batch.temp_dir = dir.path().join("uploads");

    let state = ApiState::new(config, Arc::new(detector))
        .unwrap()
        .with_opener(Arc::new(
            |_: &Path| -> Result<Box<dyn FrameSource>, CaptureError> {
                Ok(Box::new(MemorySource::synthetic(120, 64, 48)))
            },
        ));
    create_router(state)
}

fn upload_request(meeting_id: &str, file_name: &str) -> Request<Body> {
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"video\"; filename=\"{f}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\nnot really a video\r\n--{b}--\r\n",
        b = BOUNDARY,
        f = file_name
    );
    Request::builder()
        .method("POST")
        .uri(format!("/video-process?id={}", meeting_id))
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn wait_for_job(app: &Router, job_id: &str) -> Value {
    for _ in 0..200 {
        let response = app
            .clone()
            .oneshot(get(&format!("/jobs/{}", job_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let record = json_body(response).await;
        if record["status"] != "pending" {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never finished", job_id);
}

#[tokio::test]
async fn test_health() {
    let dir = TempDir::new().unwrap();
    let app = create_test_app(&dir, ScriptedDetector::new());

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_wrong_extension_is_rejected() {
    let dir = TempDir::new().unwrap();
    let app = create_test_app(&dir, ScriptedDetector::new());

    let response = app.oneshot(upload_request("meet-1", "slides.pdf")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["message"], "Incorrect file format");
    assert_eq!(body["meeting_id"], "meet-1");
    assert_eq!(body["file_paths"], Value::Array(vec![]));
    assert_eq!(body["time_taken"], 0.0);
}

#[tokio::test]
async fn test_upload_scans_in_background() {
    let dir = TempDir::new().unwrap();
    let bbox = BoundingBox::new(8.0, 8.0, 40.0, 30.0, 0, "document");
    let app = create_test_app(&dir, ScriptedDetector::document_at([49, 99], bbox));

    let response = app
        .clone()
        .oneshot(upload_request("meet-2", "CALL.MP4"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Your request is being processed");
    assert_eq!(body["id"], "meet-2");
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let record = wait_for_job(&app, &job_id).await;
    assert_eq!(record["status"], "done");
    assert_eq!(record["meeting_id"], "meet-2");
    let result = &record["result"];
    assert_eq!(result["message"], "Success");
    let paths = result["file_paths"].as_array().unwrap();
    assert_eq!(paths.len(), 2);

    // upload removed after the scan
    let uploads = std::fs::read_dir(dir.path().join("uploads")).unwrap().count();
    assert_eq!(uploads, 0);

    let image = app
        .oneshot(get(&format!("/images/{}", paths[0].as_str().unwrap())))
        .await
        .unwrap();
    assert_eq!(image.status(), StatusCode::OK);
    assert_eq!(image.headers()["content-type"], "image/jpeg");
}

#[tokio::test]
async fn test_upload_without_documents() {
    let dir = TempDir::new().unwrap();
    let app = create_test_app(&dir, ScriptedDetector::new());

    let response = app
        .clone()
        .oneshot(upload_request("meet-3", "call.webm"))
        .await
        .unwrap();
    let job_id = json_body(response).await["job_id"]
        .as_str()
        .unwrap()
        .to_string();

    let record = wait_for_job(&app, &job_id).await;
    assert_eq!(record["status"], "done");
    assert_eq!(record["result"]["message"], "No Document Detected");
    assert_eq!(record["result"]["file_paths"], Value::Array(vec![]));
}

#[tokio::test]
async fn test_missing_video_part() {
    let dir = TempDir::new().unwrap();
    let app = create_test_app(&dir, ScriptedDetector::new());

    let body = format!("--{b}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhi\r\n--{b}--\r\n", b = BOUNDARY);
    let request = Request::builder()
        .method("POST")
        .uri("/video-process?id=m")
        .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "MISSING_VIDEO");
}

#[tokio::test]
async fn test_unknown_job_is_404() {
    let dir = TempDir::new().unwrap();
    let app = create_test_app(&dir, ScriptedDetector::new());

    let response = app
        .clone()
        .oneshot(get("/jobs/7d444840-9dc0-11d1-b245-5ffdce74fad2"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(get("/jobs/not-a-uuid")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_image_path_traversal_rejected() {
    let dir = TempDir::new().unwrap();
    let app = create_test_app(&dir, ScriptedDetector::new());

    let response = app.oneshot(get("/images/../x")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_image_is_404() {
    let dir = TempDir::new().unwrap();
    let app = create_test_app(&dir, ScriptedDetector::new());

    let response = app.oneshot(get("/images/nothing.jpg")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
