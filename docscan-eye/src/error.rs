//! Error types for docscan-eye

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Stream read error: {0}")]
    StreamRead(String),

    #[error("Detector invocation error: {0}")]
    DetectorInvocation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ONNX Runtime error: {0}")]
    Ort(String),

    #[error("OpenCV error: {0}")]
    OpenCv(String),
}

impl CaptureError {
    /// Errors that spoil one frame but leave the stream usable
    pub fn is_frame_local(&self) -> bool {
        matches!(self, CaptureError::DetectorInvocation(_))
    }
}

impl From<reqwest::Error> for CaptureError {
    fn from(err: reqwest::Error) -> Self {
        CaptureError::DetectorInvocation(format!("inference request failed: {}", err))
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for CaptureError {
    fn from(err: opencv::Error) -> Self {
        CaptureError::OpenCv(err.message)
    }
}
