use super::Detector;
use crate::error::CaptureError;
use crate::frame::Frame;
use docscan_core::BoundingBox;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// Detector answering from a fixed per-frame script.
///
/// Frames with no entry yield no boxes. Every call is recorded so callers can
/// check which frames reached detection.
#[derive(Default)]
pub struct ScriptedDetector {
    script: HashMap<u64, Vec<BoundingBox>>,
    fallback: Vec<BoundingBox>,
    failures: HashSet<u64>,
    calls: Mutex<Vec<u64>>,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The same box on the given frames
    pub fn document_at(indices: impl IntoIterator<Item = u64>, bbox: BoundingBox) -> Self {
        let mut detector = Self::new();
        for index in indices {
            detector = detector.with_boxes(index, vec![bbox.clone()]);
        }
        detector
    }

    /// The same boxes on every frame
    pub fn always(boxes: Vec<BoundingBox>) -> Self {
        Self {
            fallback: boxes,
            ..Self::default()
        }
    }

    pub fn with_boxes(mut self, index: u64, boxes: Vec<BoundingBox>) -> Self {
        self.script.insert(index, boxes);
        self
    }

    /// Fail with an invocation error on the frame at `index`
    pub fn failing_on(mut self, index: u64) -> Self {
        self.failures.insert(index);
        self
    }

    /// Frame indices seen so far, in call order
    pub fn calls(&self) -> Vec<u64> {
        self.calls.lock().clone()
    }
}

impl Detector for ScriptedDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<BoundingBox>, CaptureError> {
        self.calls.lock().push(frame.index);

        if self.failures.contains(&frame.index) {
            return Err(CaptureError::DetectorInvocation(format!(
                "scripted failure on frame {}",
                frame.index
            )));
        }

        Ok(self
            .script
            .get(&frame.index)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}
