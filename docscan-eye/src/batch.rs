//! Whole-video document scan
//!
//! Every sampled frame goes through the detector and every document box is
//! cropped out; no target region is involved.

use crate::detector::Detector;
use crate::error::CaptureError;
use crate::sampler::{CancelFlag, FrameSampler};
use crate::source::{open_video, FrameSource};
use crate::writer::{generate_id, ArtifactWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The scan finished without a single document crop
    NoResults,
    Saved(Vec<PathBuf>),
}

impl ScanOutcome {
    pub fn paths(&self) -> &[PathBuf] {
        match self {
            ScanOutcome::NoResults => &[],
            ScanOutcome::Saved(paths) => paths,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.paths().is_empty()
    }
}

pub struct BatchScanner {
    detector: Arc<dyn Detector>,
    writer: ArtifactWriter,
    stride: u32,
    document_class_id: usize,
}

impl BatchScanner {
    pub fn new(
        detector: Arc<dyn Detector>,
        writer: ArtifactWriter,
        stride: u32,
        document_class_id: usize,
    ) -> Result<Self, CaptureError> {
        if stride == 0 {
            return Err(CaptureError::Config("batch stride must be > 0".to_string()));
        }

        Ok(Self {
            detector,
            writer,
            stride,
            document_class_id,
        })
    }

    pub fn writer(&self) -> &ArtifactWriter {
        &self.writer
    }

    pub fn scan_file(&self, path: &Path) -> Result<ScanOutcome, CaptureError> {
        info!("Scanning video {}", path.display());
        self.scan(open_video(path)?, None)
    }

    pub fn scan<S: FrameSource>(
        &self,
        source: S,
        cancel: Option<CancelFlag>,
    ) -> Result<ScanOutcome, CaptureError> {
        let mut sampler = FrameSampler::new(source, self.stride)?;
        if let Some(cancel) = cancel {
            sampler = sampler.with_cancel(cancel);
        }

        let mut crops = Vec::new();
        for item in sampler.by_ref() {
            let (index, frame) = item?;

            let boxes = match self.detector.detect(&frame) {
                Ok(boxes) => boxes,
                Err(e) if e.is_frame_local() => {
                    warn!("Skipping frame {}: {}", index, e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            for bbox in boxes.iter().filter(|b| b.class_id == self.document_class_id) {
                match frame.crop(bbox)? {
                    Some(crop) => crops.push(crop),
                    None => debug!("Frame {}: degenerate box {} skipped", index, bbox),
                }
            }
        }

        info!(
            "Scan read {} frames, {} document crops",
            sampler.frames_read(),
            crops.len()
        );

        if crops.is_empty() {
            return Ok(ScanOutcome::NoResults);
        }

        let paths = self.writer.save_all(&crops, &generate_id())?;
        Ok(ScanOutcome::Saved(paths))
    }
}
