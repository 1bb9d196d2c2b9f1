//! YOLOv8 document detector on ONNX Runtime

use super::{non_max_suppression, Detector};
use crate::error::CaptureError;
use crate::frame::Frame;
use docscan_core::{BoundingBox, DetectorConfig};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use parking_lot::Mutex;
use std::path::Path;
use tracing::{debug, info};

/// YOLOv8 model exported with a single `[1, 4 + classes, anchors]` output
pub struct YoloDetector {
    session: Mutex<Session>,
    input_size: u32,
    class_names: Vec<String>,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl YoloDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self, CaptureError> {
        let model_path: &Path = &config.model_path;
        if !model_path.exists() {
            return Err(CaptureError::Config(format!(
                "model file {} does not exist",
                model_path.display()
            )));
        }

        let ort_err = |e: &dyn std::fmt::Display| CaptureError::Ort(format!("Failed to load YOLO model: {}", e));
        let session = Session::builder()
            .map_err(|e| ort_err(&e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ort_err(&e))?
            .commit_from_file(model_path)
            .map_err(|e| ort_err(&e))?;

        info!("YOLO model loaded from {:?}", model_path);

        Ok(Self {
            session: Mutex::new(session),
            input_size: config.input_size,
            class_names: config.class_names.clone(),
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
        })
    }

    fn class_name(&self, class_id: usize) -> String {
        self.class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }
}

impl Detector for YoloDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<BoundingBox>, CaptureError> {
        let image = frame.to_image()?;
        let size = self.input_size as usize;
        let input = Tensor::from_array(([1usize, 3, size, size], preprocess(&image, self.input_size)))
            .map_err(|e| CaptureError::DetectorInvocation(format!("Failed to create input tensor: {}", e)))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| CaptureError::DetectorInvocation(format!("YOLO inference failed: {}", e)))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| CaptureError::DetectorInvocation(format!("Failed to extract output tensor: {}", e)))?;
        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();

        let scale = (
            frame.width as f32 / self.input_size as f32,
            frame.height as f32 / self.input_size as f32,
        );
        let raw = decode_output(&dims, data, self.confidence_threshold, scale)?;

        let boxes: Vec<BoundingBox> = raw
            .into_iter()
            .map(|r| {
                BoundingBox::new(r.xmin, r.ymin, r.xmax, r.ymax, r.class_id, self.class_name(r.class_id))
                    .with_confidence(r.confidence)
            })
            .collect();
        let boxes = non_max_suppression(boxes, self.iou_threshold);

        debug!("YOLO detected {} objects on frame {}", boxes.len(), frame.index);
        Ok(boxes)
    }
}

/// Resize to the square model input and lay out as normalized CHW floats
fn preprocess(image: &RgbImage, input_size: u32) -> Vec<f32> {
    let resized = imageops::resize(image, input_size, input_size, FilterType::Triangle);
    let plane = (input_size * input_size) as usize;
    let mut data = vec![0.0f32; 3 * plane];

    for (i, pixel) in resized.pixels().enumerate() {
        for c in 0..3 {
            data[c * plane + i] = pixel[c] as f32 / 255.0;
        }
    }
    data
}

#[derive(Debug, Clone, PartialEq)]
struct RawDetection {
    xmin: f32,
    ymin: f32,
    xmax: f32,
    ymax: f32,
    class_id: usize,
    confidence: f32,
}

/// Decode `[1, 4 + classes, anchors]`: per anchor `cx, cy, w, h` then class scores
fn decode_output(
    dims: &[usize],
    data: &[f32],
    threshold: f32,
    scale: (f32, f32),
) -> Result<Vec<RawDetection>, CaptureError> {
    let [_, rows, anchors] = dims else {
        return Err(CaptureError::DetectorInvocation(format!(
            "unexpected YOLO output shape {:?}",
            dims
        )));
    };
    let (rows, anchors) = (*rows, *anchors);
    if rows <= 4 || data.len() < rows * anchors {
        return Err(CaptureError::DetectorInvocation(format!(
            "YOLO output too small for shape {:?}",
            dims
        )));
    }

    let at = |row: usize, anchor: usize| data[row * anchors + anchor];
    let mut detections = Vec::new();

    for a in 0..anchors {
        let (class_id, confidence) = (4..rows)
            .map(|r| (r - 4, at(r, a)))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        if !confidence.is_finite() || confidence < threshold {
            continue;
        }

        let (cx, cy, w, h) = (at(0, a), at(1, a), at(2, a), at(3, a));
        if w <= 0.0 || h <= 0.0 {
            continue;
        }

        detections.push(RawDetection {
            xmin: (cx - w / 2.0) * scale.0,
            ymin: (cy - h / 2.0) * scale.1,
            xmax: (cx + w / 2.0) * scale.0,
            ymax: (cy + h / 2.0) * scale.1,
            class_id,
            confidence,
        });
    }

    Ok(detections)
}
