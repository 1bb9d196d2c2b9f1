//! OpenCV `VideoCapture` for webcams and video files

use super::FrameSource;
use crate::error::CaptureError;
use crate::frame::Frame;
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{VideoCapture, CAP_ANY, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH},
};
use std::path::Path;
use tracing::info;

pub struct OpenCvSource {
    capture: VideoCapture,
    label: String,
    next_index: u64,
}

impl OpenCvSource {
    pub fn open_camera(camera_id: i32, resolution: (u32, u32)) -> Result<Self, CaptureError> {
        let mut capture = VideoCapture::new(camera_id, CAP_ANY)
            .map_err(|e| CaptureError::SourceUnavailable(format!("Failed to open camera {}: {}", camera_id, e)))?;

        if !capture.is_opened()? {
            return Err(CaptureError::SourceUnavailable(format!("Camera {} failed to open", camera_id)));
        }

        let (width, height) = resolution;
        if width == 0 || height == 0 {
            return Err(CaptureError::Config("camera resolution must be non-zero".to_string()));
        }

        capture.set(CAP_PROP_FRAME_WIDTH, width as f64)?;
        capture.set(CAP_PROP_FRAME_HEIGHT, height as f64)?;

        info!("Camera {} initialized at {}x{}", camera_id, width, height);

        Ok(Self {
            capture,
            label: format!("camera {}", camera_id),
            next_index: 0,
        })
    }

    pub fn open_file(path: &Path) -> Result<Self, CaptureError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| CaptureError::SourceUnavailable(format!("non UTF-8 path {:?}", path)))?;

        let capture = VideoCapture::from_file(path_str, CAP_ANY)
            .map_err(|e| CaptureError::SourceUnavailable(format!("Failed to open {}: {}", path_str, e)))?;

        if !capture.is_opened()? {
            return Err(CaptureError::SourceUnavailable(format!("{} could not be opened", path_str)));
        }

        info!("Opened video {}", path_str);

        Ok(Self {
            capture,
            label: path_str.to_string(),
            next_index: 0,
        })
    }

    fn read_mat(&mut self) -> Result<Option<Mat>, CaptureError> {
        let mut mat = Mat::default();
        let grabbed = self
            .capture
            .read(&mut mat)
            .map_err(|e| CaptureError::StreamRead(format!("{}: {}", self.label, e)))?;

        if !grabbed || mat.empty() {
            return Ok(None);
        }
        Ok(Some(mat))
    }
}

impl FrameSource for OpenCvSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        let Some(bgr) = self.read_mat()? else {
            return Ok(None);
        };

        let mut rgb = Mat::default();
        imgproc::cvt_color(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

        let width = rgb.cols() as u32;
        let height = rgb.rows() as u32;
        let data = rgb.data_bytes()?.to_vec();

        let index = self.next_index;
        self.next_index += 1;
        Frame::new(width, height, data, index)
            .map(Some)
            .map_err(|e| CaptureError::StreamRead(e.to_string()))
    }

    fn skip_frame(&mut self) -> Result<bool, CaptureError> {
        let grabbed = self
            .capture
            .grab()
            .map_err(|e| CaptureError::StreamRead(format!("{}: {}", self.label, e)))?;
        if grabbed {
            self.next_index += 1;
        }
        Ok(grabbed)
    }
}
