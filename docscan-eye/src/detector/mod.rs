//! Detector adapters
//!
//! The detection model is a black box reached through [`Detector::detect`].
//! Adapters return boxes of every class the model knows; [`ClassFilter`]
//! narrows them down to the document class before the pipeline sees them.

mod remote;
mod scripted;
#[cfg(feature = "onnx")]
mod yolo;

pub use remote::RemoteDetector;
pub use scripted::ScriptedDetector;
#[cfg(feature = "onnx")]
pub use yolo::YoloDetector;

use crate::error::CaptureError;
use crate::frame::Frame;
use docscan_core::{BoundingBox, DetectorConfig, DetectorKind};
use std::sync::Arc;
use tracing::{debug, info};

/// Object detector over a single frame.
///
/// Must not modify the frame. An empty result means nothing was found; errors
/// are reserved for invocation failures such as a malformed frame.
#[cfg_attr(test, mockall::automock)]
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<BoundingBox>, CaptureError>;
}

impl<D: Detector + ?Sized> Detector for Arc<D> {
    fn detect(&self, frame: &Frame) -> Result<Vec<BoundingBox>, CaptureError> {
        (**self).detect(frame)
    }
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(&self, frame: &Frame) -> Result<Vec<BoundingBox>, CaptureError> {
        (**self).detect(frame)
    }
}

/// Keeps only boxes of one class
pub struct ClassFilter<D> {
    inner: D,
    class_id: usize,
}

impl<D: Detector> ClassFilter<D> {
    pub fn new(inner: D, class_id: usize) -> Self {
        Self { inner, class_id }
    }

    pub fn class_id(&self) -> usize {
        self.class_id
    }
}

impl<D: Detector> Detector for ClassFilter<D> {
    fn detect(&self, frame: &Frame) -> Result<Vec<BoundingBox>, CaptureError> {
        let mut boxes = self.inner.detect(frame)?;
        let before = boxes.len();
        boxes.retain(|b| b.class_id == self.class_id);
        if boxes.len() != before {
            debug!(
                "Dropped {} boxes outside class {}",
                before - boxes.len(),
                self.class_id
            );
        }
        Ok(boxes)
    }
}

/// Build the configured detector, already narrowed to `class_id`
pub fn build_detector(
    config: &DetectorConfig,
    class_id: usize,
) -> Result<Box<dyn Detector>, CaptureError> {
    match config.kind {
        DetectorKind::Remote => {
            info!("Using remote detector at {}", config.endpoint);
            let remote = RemoteDetector::new(config)?;
            Ok(Box::new(ClassFilter::new(remote, class_id)))
        }
        #[cfg(feature = "onnx")]
        DetectorKind::Onnx => {
            let yolo = YoloDetector::new(config)?;
            Ok(Box::new(ClassFilter::new(yolo, class_id)))
        }
        #[cfg(not(feature = "onnx"))]
        DetectorKind::Onnx => Err(CaptureError::Config(
            "ONNX detector requested but docscan-eye was built without the `onnx` feature".to_string(),
        )),
    }
}

/// Greedy non-maximum suppression, per class, highest confidence first
pub fn non_max_suppression(mut boxes: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    boxes.retain(|b| b.is_finite() && b.confidence.map_or(true, f32::is_finite));
    boxes.sort_by(|a, b| {
        let ca = a.confidence.unwrap_or(0.0);
        let cb = b.confidence.unwrap_or(0.0);
        cb.partial_cmp(&ca).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<BoundingBox> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        let suppressed = keep
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > iou_threshold);
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}
