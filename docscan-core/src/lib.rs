//! Shared types for the docscan workspace: geometry and configuration.

pub mod types;
pub mod config;

pub use config::{
    BatchConfig, CaptureConfig, ConfigError, DetectorConfig, DetectorKind, DocscanConfig,
    PolicyKind, ServerConfig, TargetConfig,
};
pub use types::{BoundingBox, TargetRegion};
