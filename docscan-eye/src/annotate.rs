//! Preview overlays: target rectangle and detection outlines

use crate::frame::Frame;
use crate::session::{Signal, StepReport};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
pub const BLUE: Rgb<u8> = Rgb([0, 0, 255]);

const THICKNESS: i64 = 2;

/// Outline `[xmin, ymin, xmax, ymax]`, clipped to the image
pub fn draw_rect(image: &mut RgbImage, coords: [f32; 4], color: Rgb<u8>) {
    // edges beyond the image stay beyond it, but line lengths are bounded by the image size
    let (img_w, img_h) = (image.width() as i64, image.height() as i64);
    let clamp_x = |v: f32| (v.round() as i64).clamp(-THICKNESS, img_w + THICKNESS);
    let clamp_y = |v: f32| (v.round() as i64).clamp(-THICKNESS, img_h + THICKNESS);
    let [xmin, ymin, xmax, ymax] = coords;
    let (xmin, xmax) = (clamp_x(xmin), clamp_x(xmax));
    let (ymin, ymax) = (clamp_y(ymin), clamp_y(ymax));

    for t in 0..THICKNESS {
        let width = xmax - xmin + 1 - 2 * t;
        let height = ymax - ymin + 1 - 2 * t;
        if width <= 0 || height <= 0 {
            break;
        }
        let rect = Rect::at((xmin + t) as i32, (ymin + t) as i32).of_size(width as u32, height as u32);
        draw_hollow_rect_mut(image, rect, color);
    }
}

/// Frame with the step's overlays: target red while searching and green on
/// capture, the considered detection blue
pub fn annotate(frame: &Frame, report: &StepReport) -> Option<RgbImage> {
    let mut image = frame.to_image().ok()?;

    if let Some(target) = report.target {
        let color = match report.signal {
            Signal::Captured { .. } | Signal::AlreadyCaptured { .. } => GREEN,
            _ => RED,
        };
        draw_rect(&mut image, target.coords(), color);
    }

    if let Some(detection) = &report.detection {
        draw_rect(&mut image, detection.coords(), BLUE);
    }

    Some(image)
}
