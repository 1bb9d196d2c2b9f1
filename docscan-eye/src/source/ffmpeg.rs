//! Video decoding through an `ffmpeg` child process
//!
//! `ffmpeg` writes raw `rgb24` frames to stdout; frame size comes from `ffprobe`
//! for files and from the requested resolution for capture devices.

use super::FrameSource;
use crate::error::CaptureError;
use crate::frame::Frame;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use tracing::{debug, info, warn};

pub struct FfmpegSource {
    child: Child,
    stdout: BufReader<ChildStdout>,
    width: u32,
    height: u32,
    frame_len: usize,
    next_index: u64,
    scratch: Vec<u8>,
    finished: bool,
}

impl FfmpegSource {
    /// Decode a video file
    pub fn open_file(path: &Path) -> Result<Self, CaptureError> {
        if !path.is_file() {
            return Err(CaptureError::SourceUnavailable(format!(
                "video file {:?} does not exist",
                path
            )));
        }

        let (width, height) = probe_dimensions(path)?;

        let mut command = Command::new("ffmpeg");
        command
            .arg("-nostdin")
            .args(["-loglevel", "error"])
            .arg("-i")
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"]);

        info!("Decoding {:?} ({}x{}) with ffmpeg", path, width, height);
        Self::spawn(command, width, height)
    }

    /// Read from a capture device. A bare number is treated as a camera index.
    pub fn open_device(device: &str, resolution: (u32, u32)) -> Result<Self, CaptureError> {
        let (width, height) = resolution;
        if width == 0 || height == 0 {
            return Err(CaptureError::Config(
                "camera resolution must be non-zero".to_string(),
            ));
        }

        let (format, input) = device_input(device);
        let mut command = Command::new("ffmpeg");
        command
            .arg("-nostdin")
            .args(["-loglevel", "error"])
            .args(["-f", format])
            .args(["-video_size", &format!("{}x{}", width, height)])
            .args(["-i", &input])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &format!("{}x{}", width, height)])
            .arg("-");

        info!("Opening camera {} ({}) at {}x{}", device, input, width, height);
        Self::spawn(command, width, height)
    }

    fn spawn(mut command: Command, width: u32, height: u32) -> Result<Self, CaptureError> {
        let frame_len = Frame::byte_len(width, height).ok_or_else(|| {
            CaptureError::SourceUnavailable(format!("frame size {}x{} overflows", width, height))
        })?;

        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CaptureError::SourceUnavailable(format!("failed to start ffmpeg: {}", e)))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            CaptureError::SourceUnavailable("ffmpeg stdout was not captured".to_string())
        })?;

        Ok(Self {
            child,
            stdout: BufReader::with_capacity(frame_len.max(8192), stdout),
            width,
            height,
            frame_len,
            next_index: 0,
            scratch: vec![0u8; frame_len],
            finished: false,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Fill the scratch buffer with one frame. `false` on a clean end of stream.
    fn read_into_scratch(&mut self) -> Result<bool, CaptureError> {
        if self.finished {
            return Ok(false);
        }

        let mut filled = 0;
        while filled < self.frame_len {
            match self.stdout.read(&mut self.scratch[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.finished = true;
                    return Err(CaptureError::StreamRead(format!(
                        "reading frame {} failed: {}",
                        self.next_index, e
                    )));
                }
            }
        }

        if filled == 0 {
            self.finished = true;
            self.check_exit_status()?;
            return Ok(false);
        }

        if filled < self.frame_len {
            self.finished = true;
            return Err(CaptureError::StreamRead(format!(
                "frame {} truncated: got {} of {} bytes",
                self.next_index, filled, self.frame_len
            )));
        }

        Ok(true)
    }

    fn check_exit_status(&mut self) -> Result<(), CaptureError> {
        let status = self
            .child
            .wait()
            .map_err(|e| CaptureError::StreamRead(format!("waiting for ffmpeg failed: {}", e)))?;

        if status.success() {
            debug!("ffmpeg finished after {} frames", self.next_index);
            Ok(())
        } else {
            Err(CaptureError::StreamRead(format!(
                "ffmpeg exited with {} after {} frames",
                status, self.next_index
            )))
        }
    }
}

impl FrameSource for FfmpegSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if !self.read_into_scratch()? {
            return Ok(None);
        }
        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(Frame {
            width: self.width,
            height: self.height,
            data: self.scratch.clone(),
            index,
        }))
    }

    fn skip_frame(&mut self) -> Result<bool, CaptureError> {
        let read = self.read_into_scratch()?;
        if read {
            self.next_index += 1;
        }
        Ok(read)
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        // The child may have exited already; kill only matters when it is still writing.
        if let Ok(None) = self.child.try_wait() {
            if let Err(e) = self.child.kill() {
                warn!("Failed to stop ffmpeg: {}", e);
            }
        }
        let _ = self.child.wait();
    }
}

fn probe_dimensions(path: &Path) -> Result<(u32, u32), CaptureError> {
    let output = Command::new("ffprobe")
        .args(["-v", "error", "-select_streams", "v:0"])
        .args(["-show_entries", "stream=width,height"])
        .args(["-of", "csv=p=0:s=x"])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| CaptureError::SourceUnavailable(format!("failed to start ffprobe: {}", e)))?;

    if !output.status.success() {
        return Err(CaptureError::SourceUnavailable(format!(
            "ffprobe could not read {:?}: {}",
            path,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_probe_output(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
        CaptureError::SourceUnavailable(format!("no video stream found in {:?}", path))
    })
}

/// Parse `ffprobe` csv output such as `640x480`
fn parse_probe_output(output: &str) -> Option<(u32, u32)> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let (w, h) = line.split_once('x')?;
    let width = w.trim().parse::<u32>().ok()?;
    let height = h.trim().trim_end_matches('x').parse::<u32>().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}

/// ffmpeg input format and device name for the current platform
fn device_input(device: &str) -> (&'static str, String) {
    let is_index = device.parse::<u32>().is_ok();

    if cfg!(target_os = "macos") {
        ("avfoundation", device.to_string())
    } else if cfg!(target_os = "windows") {
        ("dshow", format!("video={}", device))
    } else if is_index {
        ("v4l2", format!("/dev/video{}", device))
    } else {
        ("v4l2", device.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output() {
        assert_eq!(parse_probe_output("640x480\n"), Some((640, 480)));
        assert_eq!(parse_probe_output("\n1920x1080x\n"), Some((1920, 1080)));
        assert_eq!(parse_probe_output(""), None);
        assert_eq!(parse_probe_output("0x480"), None);
        assert_eq!(parse_probe_output("garbage"), None);
    }

    #[test]
    fn test_open_missing_file() {
        let result = FfmpegSource::open_file(Path::new("/nonexistent/video.mp4"));
        assert!(matches!(result, Err(CaptureError::SourceUnavailable(_))));
    }

    #[test]
    fn test_open_device_zero_resolution() {
        let result = FfmpegSource::open_device("0", (0, 480));
        assert!(matches!(result, Err(CaptureError::Config(_))));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_device_input_linux() {
        assert_eq!(device_input("2"), ("v4l2", "/dev/video2".to_string()));
        assert_eq!(device_input("/dev/video5"), ("v4l2", "/dev/video5".to_string()));
    }
}
