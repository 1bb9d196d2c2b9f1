//! Region acceptance policies
//!
//! Decide whether a detected document box lines up with the target region.

use docscan_core::{BoundingBox, CaptureConfig, PolicyKind, TargetRegion};

pub trait RegionPolicy: Send + Sync {
    fn accepts(&self, target: &TargetRegion, detected: &BoundingBox) -> bool;
}

/// Every coordinate within `atol + rtol * |detected|` of the target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosenessPolicy {
    pub rtol: f32,
    pub atol: f32,
}

impl Default for ClosenessPolicy {
    fn default() -> Self {
        Self {
            rtol: 0.05,
            atol: 0.05,
        }
    }
}

impl ClosenessPolicy {
    pub fn new(rtol: f32, atol: f32) -> Self {
        Self { rtol, atol }
    }

    fn is_close(&self, target: f32, detected: f32) -> bool {
        (target - detected).abs() <= self.atol + self.rtol * detected.abs()
    }
}

impl RegionPolicy for ClosenessPolicy {
    fn accepts(&self, target: &TargetRegion, detected: &BoundingBox) -> bool {
        target
            .coords()
            .iter()
            .zip(detected.coords().iter())
            .all(|(&t, &d)| self.is_close(t, d))
    }
}

/// Detected box inside the target grown by `margin` pixels on each side
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainmentPolicy {
    pub margin: f32,
}

impl ContainmentPolicy {
    pub fn new(margin: f32) -> Self {
        Self { margin }
    }
}

impl RegionPolicy for ContainmentPolicy {
    fn accepts(&self, target: &TargetRegion, detected: &BoundingBox) -> bool {
        if !detected.is_finite() {
            return false;
        }
        let [txmin, tymin, txmax, tymax] = target.coords();
        detected.xmin >= txmin - self.margin
            && detected.ymin >= tymin - self.margin
            && detected.xmax <= txmax + self.margin
            && detected.ymax <= tymax + self.margin
    }
}

pub fn policy_from_config(config: &CaptureConfig) -> Box<dyn RegionPolicy> {
    match config.policy {
        PolicyKind::Closeness => Box::new(ClosenessPolicy::new(config.rtol, config.atol)),
        PolicyKind::Containment { margin } => Box::new(ContainmentPolicy::new(margin)),
    }
}
