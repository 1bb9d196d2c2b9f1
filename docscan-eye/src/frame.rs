//! Decoded video frames

use crate::error::CaptureError;
use docscan_core::BoundingBox;
use image::{ImageOutputFormat, RgbImage};
use std::io::Cursor;

/// Packed 8-bit RGB frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    /// Position of the frame in its source stream
    pub index: u64,
}

impl Frame {
    pub const CHANNELS: u32 = 3;

    pub fn new(width: u32, height: u32, data: Vec<u8>, index: u64) -> Result<Self, CaptureError> {
        let frame = Self {
            width,
            height,
            data,
            index,
        };
        frame.validate()?;
        Ok(frame)
    }

    /// Frame of a single colour
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], index: u64) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * Self::CHANNELS) as usize)
            .collect();
        Self {
            width,
            height,
            data,
            index,
        }
    }

    pub fn from_image(image: RgbImage, index: u64) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
            index,
        }
    }

    /// `(height, width, channels)`
    pub fn shape(&self) -> (u32, u32, u32) {
        (self.height, self.width, Self::CHANNELS)
    }

    pub fn byte_len(width: u32, height: u32) -> Option<usize> {
        width
            .checked_mul(height)
            .and_then(|p| p.checked_mul(Self::CHANNELS))
            .map(|n| n as usize)
    }

    /// Check that the buffer matches the declared dimensions
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::DetectorInvocation(format!(
                "frame {} has empty shape {}x{}",
                self.index, self.width, self.height
            )));
        }

        let expected = Self::byte_len(self.width, self.height).ok_or_else(|| {
            CaptureError::DetectorInvocation("frame dimensions overflow".to_string())
        })?;

        if self.data.len() != expected {
            return Err(CaptureError::DetectorInvocation(format!(
                "frame {} holds {} bytes, expected {} for {}x{}x{}",
                self.index,
                self.data.len(),
                expected,
                self.width,
                self.height,
                Self::CHANNELS
            )));
        }

        Ok(())
    }

    pub fn to_image(&self) -> Result<RgbImage, CaptureError> {
        self.validate()?;
        RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            CaptureError::DetectorInvocation(format!("frame {} is not a valid image", self.index))
        })
    }

    /// Cut the box region out of the frame; `None` when the box misses the frame
    pub fn crop(&self, bbox: &BoundingBox) -> Result<Option<RgbImage>, CaptureError> {
        let Some((x, y, w, h)) = bbox.clamped_rect(self.width, self.height) else {
            return Ok(None);
        };
        let image = self.to_image()?;
        Ok(Some(image::imageops::crop_imm(&image, x, y, w, h).to_image()))
    }

    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>, CaptureError> {
        encode_jpeg(&self.to_image()?, quality)
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, CaptureError> {
    let mut buffer = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut buffer, ImageOutputFormat::Jpeg(quality))?;
    Ok(buffer.into_inner())
}
