use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::TargetConfig;

/// Axis-aligned box in frame pixel space, as produced by a detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
    pub class_id: usize,
    pub class_name: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl BoundingBox {
    pub fn new(
        xmin: f32,
        ymin: f32,
        xmax: f32,
        ymax: f32,
        class_id: usize,
        class_name: impl Into<String>,
    ) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
            class_id,
            class_name: class_name.into(),
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Coordinates in `[xmin, ymin, xmax, ymax]` order.
    pub fn coords(&self) -> [f32; 4] {
        [self.xmin, self.ymin, self.xmax, self.ymax]
    }

    pub fn width(&self) -> f32 {
        (self.xmax - self.xmin).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.ymax - self.ymin).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn is_finite(&self) -> bool {
        self.coords().iter().all(|c| c.is_finite())
    }

    /// Intersection over union with another box. Zero for disjoint or degenerate boxes.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        if !self.is_finite() || !other.is_finite() {
            return 0.0;
        }

        let inter_w = (self.xmax.min(other.xmax) - self.xmin.max(other.xmin)).max(0.0);
        let inter_h = (self.ymax.min(other.ymax) - self.ymin.max(other.ymin)).max(0.0);
        let inter = inter_w * inter_h;
        let union = self.area() + other.area() - inter;

        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Integer pixel rectangle `(x, y, w, h)` clamped to a `width` x `height` frame.
    /// Returns `None` when nothing of the box remains inside the frame.
    pub fn clamped_rect(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        if !self.is_finite() {
            return None;
        }

        let x0 = self.xmin.max(0.0).min(width as f32) as u32;
        let y0 = self.ymin.max(0.0).min(height as f32) as u32;
        let x1 = self.xmax.max(0.0).min(width as f32) as u32;
        let y1 = self.ymax.max(0.0).min(height as f32) as u32;

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some((x0, y0, x1 - x0, y1 - y0))
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{:.1}, {:.1}, {:.1}, {:.1}]",
            self.class_name, self.xmin, self.ymin, self.xmax, self.ymax
        )?;
        if let Some(conf) = self.confidence {
            write!(f, " conf={:.2}", conf)?;
        }
        Ok(())
    }
}

/// The on-screen rectangle a document has to line up with before it is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRegion {
    pub top_left: (i64, i64),
    pub bottom_right: (i64, i64),
}

impl TargetRegion {
    /// Region for a frame of `height` x `width` pixels.
    ///
    /// The rectangle is centred on the frame, then its top edge is pushed down by
    /// `top_offset` and its bottom edge by `bottom_offset`, matching the expected
    /// camera framing of a document held below the face.
    pub fn from_shape(height: u32, width: u32, target: &TargetConfig) -> Self {
        let cx = (width / 2) as f64;
        let cy = (height / 2) as f64;
        let x = (cx - target.width as f64 / 2.0) as i64;
        let y = (cy - target.height as f64 / 2.0) as i64;

        Self {
            top_left: (x, y + target.top_offset),
            bottom_right: (
                x + target.width as i64,
                y + target.height as i64 + target.bottom_offset,
            ),
        }
    }

    /// Coordinates in `[xmin, ymin, xmax, ymax]` order.
    pub fn coords(&self) -> [f32; 4] {
        [
            self.top_left.0 as f32,
            self.top_left.1 as f32,
            self.bottom_right.0 as f32,
            self.bottom_right.1 as f32,
        ]
    }

    pub fn to_box(&self, class_id: usize, class_name: &str) -> BoundingBox {
        let [xmin, ymin, xmax, ymax] = self.coords();
        BoundingBox::new(xmin, ymin, xmax, ymax, class_id, class_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_region_default_shape() {
        let region = TargetRegion::from_shape(480, 640, &TargetConfig::default());
        // cx=320, cy=240 -> x=220, y=200
        assert_eq!(region.top_left, (220, 300));
        assert_eq!(region.bottom_right, (420, 460));
    }

    #[test]
    fn test_target_region_odd_dimensions() {
        let region = TargetRegion::from_shape(481, 641, &TargetConfig::default());
        assert_eq!(region.top_left, (220, 300));
        assert_eq!(region.bottom_right, (420, 460));
    }

    #[test]
    fn test_target_region_small_frame_goes_negative() {
        let region = TargetRegion::from_shape(20, 20, &TargetConfig::default());
        assert_eq!(region.top_left, (-90, 70));
        assert_eq!(region.bottom_right, (110, 230));
    }

    #[test]
    fn test_bbox_iou() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0, 0, "document");
        let b = BoundingBox::new(5.0, 0.0, 15.0, 10.0, 0, "document");
        let iou = a.iou(&b);
        assert!((iou - 50.0 / 150.0).abs() < 1e-6);

        let far = BoundingBox::new(100.0, 100.0, 110.0, 110.0, 0, "document");
        assert_eq!(a.iou(&far), 0.0);
    }

    #[test]
    fn test_bbox_clamped_rect() {
        let b = BoundingBox::new(-5.0, 10.0, 50.0, 200.0, 0, "document");
        assert_eq!(b.clamped_rect(40, 100), Some((0, 10, 40, 90)));

        let outside = BoundingBox::new(60.0, 10.0, 80.0, 20.0, 0, "document");
        assert_eq!(outside.clamped_rect(40, 100), None);

        let nan = BoundingBox::new(f32::NAN, 0.0, 1.0, 1.0, 0, "document");
        assert_eq!(nan.clamped_rect(40, 100), None);
    }

    #[test]
    fn test_bbox_display() {
        let b = BoundingBox::new(1.0, 2.0, 3.0, 4.0, 0, "document").with_confidence(0.5);
        assert_eq!(b.to_string(), "document[1.0, 2.0, 3.0, 4.0] conf=0.50");
    }
}
