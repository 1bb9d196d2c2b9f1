use super::FrameSource;
use crate::error::CaptureError;
use crate::frame::Frame;
use std::collections::VecDeque;

/// Frames held in memory, optionally failing at a given position
pub struct MemorySource {
    frames: VecDeque<Frame>,
    position: u64,
    fail_at: Option<u64>,
}

impl MemorySource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
            position: 0,
            fail_at: None,
        }
    }

    /// `count` solid grey frames of `width` x `height`, indexed from zero
    pub fn synthetic(count: u64, width: u32, height: u32) -> Self {
        let frames = (0..count)
            .map(|i| Frame::filled(width, height, [(i % 256) as u8, 128, 64], i))
            .collect();
        Self::new(frames)
    }

    /// Report a read error instead of the frame at `position`
    pub fn failing_at(mut self, position: u64) -> Self {
        self.fail_at = Some(position);
        self
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.fail_at == Some(self.position) {
            return Err(CaptureError::StreamRead(format!(
                "simulated read failure at frame {}",
                self.position
            )));
        }

        let frame = self.frames.pop_front();
        if frame.is_some() {
            self.position += 1;
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_drains_in_order() {
        let mut source = MemorySource::synthetic(3, 4, 4);
        assert_eq!(source.next_frame().unwrap().unwrap().index, 0);
        assert!(source.skip_frame().unwrap());
        assert_eq!(source.next_frame().unwrap().unwrap().index, 2);
        assert!(source.next_frame().unwrap().is_none());
        assert!(!source.skip_frame().unwrap());
    }

    #[test]
    fn test_memory_source_failure() {
        let mut source = MemorySource::synthetic(3, 4, 4).failing_at(1);
        assert!(source.next_frame().unwrap().is_some());
        assert!(matches!(source.next_frame(), Err(CaptureError::StreamRead(_))));
    }
}
