// HTTP API: video upload, job status and saved image download

use crate::jobs::{analyze_video, DocumentAnalysisResponse, JobStore, SourceOpener};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, Response, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use docscan_core::DocscanConfig;
use docscan_eye::source::open_video;
use docscan_eye::{ArtifactWriter, BatchScanner, CaptureError, Detector};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path as FsPath, PathBuf};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<DocscanConfig>,
    pub scanner: Arc<BatchScanner>,
    pub jobs: Arc<JobStore>,
    pub opener: SourceOpener,
}

impl ApiState {
    /// State scanning uploads with `detector`, saving crops to the batch output directory
    pub fn new(config: DocscanConfig, detector: Arc<dyn Detector>) -> Result<Self, CaptureError> {
        let writer = ArtifactWriter::new(&config.batch.output_dir, config.capture.buffer_cap)?;
        let scanner = BatchScanner::new(
            detector,
            writer,
            config.batch.stride,
            config.capture.document_class_id,
        )?;

        let retention = i64::try_from(config.batch.job_retention_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or_else(chrono::Duration::max_value);

        Ok(Self {
            config: Arc::new(config),
            scanner: Arc::new(scanner),
            jobs: Arc::new(JobStore::with_retention(retention)),
            opener: Arc::new(open_video),
        })
    }

    /// Replace how uploaded videos are opened
    pub fn with_opener(mut self, opener: SourceOpener) -> Self {
        self.opener = opener;
        self
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

fn error_response(status: StatusCode, error: impl Into<String>, code: &str) -> Response<Body> {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
        }),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct ProcessQuery {
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub message: String,
    pub id: String,
    pub job_id: Uuid,
}

/// Create HTTP router with all API routes
pub fn create_router(state: ApiState) -> Router {
    let body_limit = state.config.batch.max_upload_bytes;

    Router::new()
        .route("/health", get(health_handler))
        .route("/video-process", post(process_video_handler))
        .route("/jobs/:job_id", get(job_handler))
        .route("/images/*path", get(image_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Lower-cased extension of `file_name` if it is an accepted video format
fn video_extension(file_name: &str, allowed: &[String]) -> Option<String> {
    let ext = FsPath::new(file_name).extension()?.to_str()?.to_ascii_lowercase();
    allowed
        .iter()
        .any(|a| a.eq_ignore_ascii_case(&ext))
        .then_some(ext)
}

async fn process_video_handler(
    State(state): State<ApiState>,
    Query(query): Query<ProcessQuery>,
    mut multipart: Multipart,
) -> Response<Body> {
    let meeting_id = query.id;

    let mut upload = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e.body_text(), "INVALID_MULTIPART"),
        };

        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if field.name() != Some("video") && upload.is_some() {
            continue;
        }

        match field.bytes().await {
            Ok(bytes) => upload = Some((file_name, bytes)),
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e.body_text(), "INVALID_MULTIPART"),
        }
    }

    let Some((file_name, bytes)) = upload else {
        return error_response(StatusCode::BAD_REQUEST, "No video file in request", "MISSING_VIDEO");
    };

    let Some(ext) = video_extension(&file_name, &state.config.batch.allowed_extensions) else {
        error!(
            "The file '{}' has an invalid extension. Valid extensions are: {}",
            file_name,
            state.config.batch.allowed_extensions.join(", ")
        );
        return (
            StatusCode::BAD_REQUEST,
            Json(DocumentAnalysisResponse::incorrect_format(&meeting_id)),
        )
            .into_response();
    };

    let temp_dir = &state.config.batch.temp_dir;
    let video_path = temp_dir.join(format!("{}.{}", Uuid::new_v4(), ext));
    let written = match tokio::fs::create_dir_all(temp_dir).await {
        Ok(()) => tokio::fs::write(&video_path, &bytes).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        error!("Failed to store upload {}: {}", video_path.display(), e);
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to store upload",
            "UPLOAD_WRITE_ERROR",
        );
    }

    let job_id = state.jobs.create(&meeting_id);
    info!(
        "Queued job {} for meeting {} ({} bytes from '{}')",
        job_id,
        meeting_id,
        bytes.len(),
        file_name
    );

    let worker_state = state.clone();
    let worker_meeting = meeting_id.clone();
    tokio::task::spawn_blocking(move || {
        let (status, response) = analyze_video(
            &worker_state.scanner,
            &worker_state.opener,
            &video_path,
            &worker_meeting,
        );
        worker_state.jobs.finish(&job_id, status, response);
    });

    Json(ProcessResponse {
        message: "Your request is being processed".to_string(),
        id: meeting_id,
        job_id,
    })
    .into_response()
}

async fn job_handler(State(state): State<ApiState>, Path(job_id): Path<String>) -> Response<Body> {
    let record = Uuid::parse_str(&job_id)
        .ok()
        .and_then(|id| state.jobs.get(&id));

    match record {
        Some(record) => Json(record).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Job not found", "JOB_NOT_FOUND"),
    }
}

/// Resolve a request path inside `root`; `None` for absolute or escaping paths
fn resolve_image_path(root: &FsPath, requested: &str) -> Option<PathBuf> {
    let requested = FsPath::new(requested);
    if requested.as_os_str().is_empty() {
        return None;
    }
    requested
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
        .then(|| root.join(requested))
}

fn content_type(path: &FsPath) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

async fn image_handler(State(state): State<ApiState>, Path(path): Path<String>) -> Response<Body> {
    let Some(full_path) = resolve_image_path(state.scanner.writer().output_dir(), &path) else {
        warn!("Rejected image path {:?}", path);
        return error_response(StatusCode::BAD_REQUEST, "Invalid path", "INVALID_PATH");
    };

    match tokio::fs::read(&full_path).await {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, content_type(&full_path))],
            bytes,
        )
            .into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            error_response(StatusCode::NOT_FOUND, "File not found", "FILE_NOT_FOUND")
        }
        Err(e) => {
            error!("Failed to read {}: {}", full_path.display(), e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file", "READ_ERROR")
        }
    }
}
