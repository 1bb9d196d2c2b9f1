//! Frame sources feeding the sampler
//!
//! - `FfmpegSource`: files and capture devices decoded by an `ffmpeg` child process
//! - `OpenCvSource`: `VideoCapture` on files or camera indices (feature: opencv)
//! - `MemorySource`: preloaded frames, for tests and synthetic streams

mod ffmpeg;
mod memory;
#[cfg(feature = "opencv")]
mod opencv;

pub use ffmpeg::FfmpegSource;
pub use memory::MemorySource;
#[cfg(feature = "opencv")]
pub use self::opencv::OpenCvSource;

use crate::error::CaptureError;
use crate::frame::Frame;
use std::path::Path;

/// Sequential producer of frames. `Ok(None)` marks end of stream.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Advance past one frame without handing it out. Returns `false` at end of stream.
    fn skip_frame(&mut self) -> Result<bool, CaptureError> {
        Ok(self.next_frame()?.is_some())
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        (**self).next_frame()
    }

    fn skip_frame(&mut self) -> Result<bool, CaptureError> {
        (**self).skip_frame()
    }
}

/// Open a video file with the best decoder compiled in
pub fn open_video(path: &Path) -> Result<Box<dyn FrameSource>, CaptureError> {
    #[cfg(feature = "opencv")]
    {
        Ok(Box::new(OpenCvSource::open_file(path)?))
    }

    #[cfg(not(feature = "opencv"))]
    {
        Ok(Box::new(FfmpegSource::open_file(path)?))
    }
}

/// Open a camera by index (`"0"`) or device path (`"/dev/video2"`)
pub fn open_camera(device: &str, resolution: (u32, u32)) -> Result<Box<dyn FrameSource>, CaptureError> {
    #[cfg(feature = "opencv")]
    {
        if let Ok(index) = device.parse::<i32>() {
            return Ok(Box::new(OpenCvSource::open_camera(index, resolution)?));
        }
    }

    Ok(Box::new(FfmpegSource::open_device(device, resolution)?))
}
