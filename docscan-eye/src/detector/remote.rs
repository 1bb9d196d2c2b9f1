//! Detector reached over HTTP
//!
//! The frame is posted as a JPEG body; the service answers with JSON boxes in
//! pixel coordinates:
//!
//! ```json
//! {"detections": [{"class_id": 0, "class_name": "document", "confidence": 0.91,
//!                  "bbox": [120.0, 80.0, 420.0, 300.0]}]}
//! ```
//!
//! A bare array of detections is accepted as well.

use super::Detector;
use crate::error::CaptureError;
use crate::frame::Frame;
use docscan_core::{BoundingBox, DetectorConfig};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const JPEG_QUALITY: u8 = 90;

#[derive(Debug, Deserialize)]
struct RemoteDetection {
    class_id: usize,
    #[serde(default)]
    class_name: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
    bbox: [f32; 4],
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RemoteResponse {
    Wrapped { detections: Vec<RemoteDetection> },
    Bare(Vec<RemoteDetection>),
}

impl RemoteResponse {
    fn into_detections(self) -> Vec<RemoteDetection> {
        match self {
            RemoteResponse::Wrapped { detections } => detections,
            RemoteResponse::Bare(detections) => detections,
        }
    }
}

pub struct RemoteDetector {
    client: Client,
    endpoint: String,
    class_names: Vec<String>,
}

impl RemoteDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self, CaptureError> {
        if config.endpoint.is_empty() {
            return Err(CaptureError::Config("detector.endpoint is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| CaptureError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            class_names: config.class_names.clone(),
        })
    }

    fn class_name(&self, class_id: usize, reported: Option<String>) -> String {
        reported
            .or_else(|| self.class_names.get(class_id).cloned())
            .unwrap_or_else(|| format!("class_{}", class_id))
    }
}

impl Detector for RemoteDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<BoundingBox>, CaptureError> {
        let body = frame.to_jpeg(JPEG_QUALITY)?;

        let response: RemoteResponse = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "image/jpeg")
            .body(body)
            .send()?
            .error_for_status()?
            .json()?;

        let boxes: Vec<BoundingBox> = response
            .into_detections()
            .into_iter()
            .map(|d| {
                let [xmin, ymin, xmax, ymax] = d.bbox;
                BoundingBox {
                    xmin,
                    ymin,
                    xmax,
                    ymax,
                    class_name: self.class_name(d.class_id, d.class_name),
                    class_id: d.class_id,
                    confidence: d.confidence,
                }
            })
            .filter(BoundingBox::is_finite)
            .collect();

        debug!("Remote detector returned {} boxes for frame {}", boxes.len(), frame.index);
        Ok(boxes)
    }
}
