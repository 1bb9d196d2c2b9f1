// Background video analysis jobs and their status store

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use docscan_eye::{BatchScanner, CaptureError, FrameSource, ScanOutcome};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Opens an uploaded video for scanning
pub type SourceOpener =
    Arc<dyn Fn(&Path) -> Result<Box<dyn FrameSource>, CaptureError> + Send + Sync>;

/// Result of one uploaded-video analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAnalysisResponse {
    pub message: String,
    pub meeting_id: String,
    /// Saved crops, relative to the batch output directory
    pub file_paths: Vec<String>,
    /// Seconds, rounded to two decimals
    pub time_taken: f64,
}

impl DocumentAnalysisResponse {
    pub const SUCCESS: &'static str = "Success";
    pub const NO_DOCUMENT: &'static str = "No Document Detected";
    pub const INCORRECT_FORMAT: &'static str = "Incorrect file format";

    pub fn incorrect_format(meeting_id: &str) -> Self {
        Self {
            message: Self::INCORRECT_FORMAT.to_string(),
            meeting_id: meeting_id.to_string(),
            file_paths: Vec::new(),
            time_taken: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub meeting_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<DocumentAnalysisResponse>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

const DEFAULT_RETENTION_SECS: i64 = 3600;

/// Job records shared between request handlers and background workers.
///
/// Finished records are dropped once they are older than the retention window;
/// pending records are kept until they finish.
#[derive(Debug)]
pub struct JobStore {
    jobs: DashMap<Uuid, JobRecord>,
    retention: Duration,
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore {
    pub fn new() -> Self {
        Self::with_retention(Duration::seconds(DEFAULT_RETENTION_SECS))
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            jobs: DashMap::new(),
            retention,
        }
    }

    /// Register a pending job, pruning expired records first
    pub fn create(&self, meeting_id: &str) -> Uuid {
        let pruned = self.prune_finished(Utc::now());
        if pruned > 0 {
            debug!("Pruned {} finished jobs", pruned);
        }

        let job_id = Uuid::new_v4();
        self.jobs.insert(
            job_id,
            JobRecord {
                job_id,
                meeting_id: meeting_id.to_string(),
                status: JobStatus::Pending,
                result: None,
                created_at: Utc::now(),
                finished_at: None,
            },
        );
        job_id
    }

    pub fn get(&self, job_id: &Uuid) -> Option<JobRecord> {
        self.jobs.get(job_id).map(|record| record.value().clone())
    }

    pub fn finish(&self, job_id: &Uuid, status: JobStatus, result: DocumentAnalysisResponse) {
        match self.jobs.get_mut(job_id) {
            Some(mut record) => {
                record.status = status;
                record.result = Some(result);
                record.finished_at = Some(Utc::now());
            }
            None => warn!("Finished unknown job {}", job_id),
        }
    }

    /// Drop finished records older than the retention window at `now`
    pub fn prune_finished(&self, now: DateTime<Utc>) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, record| match record.finished_at {
            Some(finished_at) => now - finished_at < self.retention,
            None => true,
        });
        before.saturating_sub(self.jobs.len())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

fn round_secs(start: Instant) -> f64 {
    (start.elapsed().as_secs_f64() * 100.0).round() / 100.0
}

/// Scan an uploaded video and build its analysis response.
///
/// The upload is removed afterwards whatever the outcome. Failures become a
/// `Failed` status carrying the error text.
pub fn analyze_video(
    scanner: &BatchScanner,
    opener: &SourceOpener,
    video_path: &Path,
    meeting_id: &str,
) -> (JobStatus, DocumentAnalysisResponse) {
    let start = Instant::now();

    let scanned = opener(video_path).and_then(|source| scanner.scan(source, None));

    if let Err(e) = std::fs::remove_file(video_path) {
        warn!("Failed to remove upload {}: {}", video_path.display(), e);
    }

    let (status, message, file_paths) = match scanned {
        Ok(ScanOutcome::Saved(paths)) => {
            let output_dir = scanner.writer().output_dir();
            let relative = paths
                .iter()
                .map(|p| {
                    p.strip_prefix(output_dir)
                        .unwrap_or(p)
                        .to_string_lossy()
                        .into_owned()
                })
                .collect();
            (
                JobStatus::Done,
                DocumentAnalysisResponse::SUCCESS.to_string(),
                relative,
            )
        }
        Ok(ScanOutcome::NoResults) => (
            JobStatus::Done,
            DocumentAnalysisResponse::NO_DOCUMENT.to_string(),
            Vec::new(),
        ),
        Err(e) => {
            error!("Analysis for meeting {} failed: {}", meeting_id, e);
            (JobStatus::Failed, e.to_string(), Vec::new())
        }
    };

    let response = DocumentAnalysisResponse {
        message,
        meeting_id: meeting_id.to_string(),
        file_paths,
        time_taken: round_secs(start),
    };
    info!("Analysis response: {:?}", response);
    (status, response)
}
