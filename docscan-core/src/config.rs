// Configuration for the docscan capture pipeline and server

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Geometry of the target rectangle a document has to line up with
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub width: u32,
    pub height: u32,
    /// Downward shift applied to the top edge, in pixels
    pub top_offset: i64,
    /// Downward shift applied to the bottom edge, in pixels
    pub bottom_offset: i64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            width: 200,
            height: 80,
            top_offset: 100,
            bottom_offset: 180,
        }
    }
}

/// How a detected box is compared with the target region
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PolicyKind {
    /// Per-coordinate closeness with relative and absolute tolerance
    Closeness,
    /// Detected box must sit inside the target grown by `margin` pixels
    Containment { margin: f32 },
}

/// Live capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Run detection on every `stride`-th frame
    pub stride: u32,
    pub target: TargetConfig,
    pub policy: PolicyKind,
    pub rtol: f32,
    pub atol: f32,
    /// How long a capture is held before archival, in seconds
    pub cooldown_secs: u64,
    /// Unarchived images allowed in the output directory
    pub buffer_cap: usize,
    /// When set, a capture that hits a full buffer does not enter the captured state
    pub strict_capture: bool,
    pub document_class_id: usize,
    pub output_dir: PathBuf,
    /// Camera device (index or device path) for the live driver
    pub camera: String,
    /// Frame size requested from the camera
    pub resolution: (u32, u32),
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            stride: 5,
            target: TargetConfig::default(),
            policy: PolicyKind::Closeness,
            rtol: 0.05,
            atol: 0.05,
            cooldown_secs: 5,
            buffer_cap: 10,
            strict_capture: false,
            document_class_id: 0,
            output_dir: PathBuf::from("streamlit_preds"),
            camera: "0".to_string(),
            resolution: (640, 480),
        }
    }
}

/// Uploaded-video scan settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub stride: u32,
    pub output_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub allowed_extensions: Vec<String>,
    /// Largest accepted upload body
    pub max_upload_bytes: usize,
    /// How long finished job records stay queryable
    pub job_retention_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            stride: 50,
            output_dir: PathBuf::from("fastapi_preds"),
            temp_dir: PathBuf::from("temp_videos"),
            allowed_extensions: vec!["mp4".to_string(), "avi".to_string(), "webm".to_string()],
            max_upload_bytes: 512 * 1024 * 1024,
            job_retention_secs: 3600,
        }
    }
}

/// Which detector backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    /// HTTP inference endpoint
    Remote,
    /// Local ONNX export of the YOLO model
    Onnx,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub kind: DetectorKind,
    pub endpoint: String,
    pub model_path: PathBuf,
    pub class_names: Vec<String>,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub input_size: u32,
    pub timeout_secs: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            kind: DetectorKind::Remote,
            endpoint: "http://127.0.0.1:8500/predict".to_string(),
            model_path: PathBuf::from("model/best.onnx"),
            class_names: vec!["document".to_string()],
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            input_size: 640,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 6868,
            log_level: "info".to_string(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocscanConfig {
    pub capture: CaptureConfig,
    pub batch: BatchConfig,
    pub detector: DetectorConfig,
    pub server: ServerConfig,
}

impl DocscanConfig {
    /// Load configuration from a JSON, TOML or YAML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        if path.contains("..") {
            return Err(ConfigError::IoError(format!(
                "Path traversal detected: '{}'",
                path
            )));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path, e)))?;
        Self::from_str(&content)
    }

    /// Load configuration from string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        if let Ok(config) = serde_json::from_str::<DocscanConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = toml::from_str::<DocscanConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = serde_yaml::from_str::<DocscanConfig>(content) {
            return Ok(config);
        }

        Err(ConfigError::ParseError("Unknown format".to_string()))
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `DOCSCAN_*` environment overrides on top of the current values
    pub fn apply_env(&mut self) {
        if let Ok(port) = std::env::var("DOCSCAN_PORT") {
            if let Ok(p) = port.parse::<u16>() {
                self.server.port = p;
            }
        }

        if let Ok(host) = std::env::var("DOCSCAN_HOST") {
            self.server.host = host;
        }

        if let Ok(log_level) = std::env::var("DOCSCAN_LOG_LEVEL") {
            self.server.log_level = log_level;
        }

        if let Ok(dir) = std::env::var("DOCSCAN_OUTPUT_DIR") {
            self.batch.output_dir = PathBuf::from(dir);
        }

        if let Ok(url) = std::env::var("DOCSCAN_DETECTOR_URL") {
            self.detector.endpoint = url;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.stride == 0 {
            return Err(ConfigError::ValidationError(
                "capture.stride must be > 0".to_string(),
            ));
        }

        if self.batch.stride == 0 {
            return Err(ConfigError::ValidationError(
                "batch.stride must be > 0".to_string(),
            ));
        }

        if self.batch.max_upload_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "batch.max_upload_bytes must be > 0".to_string(),
            ));
        }

        if self.capture.buffer_cap == 0 {
            return Err(ConfigError::ValidationError(
                "capture.buffer_cap must be > 0".to_string(),
            ));
        }

        if self.capture.target.width == 0 || self.capture.target.height == 0 {
            return Err(ConfigError::ValidationError(
                "capture.target must have non-zero width and height".to_string(),
            ));
        }

        if !(self.capture.rtol >= 0.0 && self.capture.atol >= 0.0) {
            return Err(ConfigError::ValidationError(
                "capture tolerances must be non-negative".to_string(),
            ));
        }

        if let PolicyKind::Containment { margin } = self.capture.policy {
            if !(margin >= 0.0) {
                return Err(ConfigError::ValidationError(
                    "containment margin must be non-negative".to_string(),
                ));
            }
        }

        if !(0.0..=1.0).contains(&self.detector.confidence_threshold) {
            return Err(ConfigError::ValidationError(
                "detector.confidence_threshold must be within [0, 1]".to_string(),
            ));
        }

        if self.detector.class_names.is_empty() {
            return Err(ConfigError::ValidationError(
                "detector.class_names cannot be empty".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Parse error: {}", e),
            ConfigError::ValidationError(e) => write!(f, "Validation error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = DocscanConfig::default();
        assert_eq!(config.capture.stride, 5);
        assert_eq!(config.batch.stride, 50);
        assert_eq!(config.batch.job_retention_secs, 3600);
        assert_eq!(config.capture.target.width, 200);
        assert_eq!(config.capture.target.height, 80);
        assert_eq!(config.capture.cooldown_secs, 5);
        assert_eq!(config.capture.buffer_cap, 10);
        assert_eq!(config.capture.policy, PolicyKind::Closeness);
        assert_eq!(config.server.port, 6868);
        assert!(!config.capture.strict_capture);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml_partial() {
        let content = r#"
[capture]
stride = 3
strict_capture = true

[server]
port = 9000
"#;
        let config = DocscanConfig::from_str(content).unwrap();
        assert_eq!(config.capture.stride, 3);
        assert!(config.capture.strict_capture);
        assert_eq!(config.capture.buffer_cap, 10);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.batch.stride, 50);
    }

    #[test]
    fn test_config_from_json() {
        let content = r#"{"batch": {"stride": 25}, "detector": {"kind": "onnx"}}"#;
        let config = DocscanConfig::from_str(content).unwrap();
        assert_eq!(config.batch.stride, 25);
        assert_eq!(config.detector.kind, DetectorKind::Onnx);
    }

    #[test]
    fn test_config_from_yaml_with_policy() {
        let content = "capture:\n  policy:\n    kind: containment\n    margin: 4.0\n";
        let config = DocscanConfig::from_str(content).unwrap();
        assert_eq!(config.capture.policy, PolicyKind::Containment { margin: 4.0 });
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docscan.toml");
        std::fs::write(&path, "[capture]\ncooldown_secs = 2\n").unwrap();
        let config = DocscanConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.capture.cooldown_secs, 2);
    }

    #[test]
    fn test_config_from_file_rejects_traversal() {
        assert!(matches!(
            DocscanConfig::from_file("../etc/docscan.toml"),
            Err(ConfigError::IoError(_))
        ));
    }

    #[test]
    fn test_config_validation_zero_stride() {
        let mut config = DocscanConfig::default();
        config.capture.stride = 0;
        assert!(config.validate().is_err());

        let mut config = DocscanConfig::default();
        config.batch.stride = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_cap_and_target() {
        let mut config = DocscanConfig::default();
        config.capture.buffer_cap = 0;
        assert!(config.validate().is_err());

        let mut config = DocscanConfig::default();
        config.capture.target.height = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_tolerances() {
        let mut config = DocscanConfig::default();
        config.capture.rtol = -0.1;
        assert!(config.validate().is_err());

        let mut config = DocscanConfig::default();
        config.capture.atol = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = DocscanConfig::default();
        config.capture.policy = PolicyKind::Containment { margin: -1.0 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_port_zero() {
        let mut config = DocscanConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }
}
