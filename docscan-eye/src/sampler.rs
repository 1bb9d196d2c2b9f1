//! Stride-based frame sampling
//!
//! Detection is the expensive step, so only every `stride`-th frame of a source
//! reaches the detector: the frames at indices `stride-1, 2*stride-1, ...`.

use crate::error::CaptureError;
use crate::frame::Frame;
use crate::source::FrameSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Whether the frame at zero-based `index` falls on a sampling boundary
pub fn is_sampled(index: u64, stride: u32) -> bool {
    stride != 0 && (index + 1) % stride as u64 == 0
}

/// Shared stop switch, checked between frames
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Lazy `(index, frame)` sequence over the sampled frames of a source.
///
/// Ends at end of stream or on cancellation. A read error is yielded once and
/// then the sequence ends.
pub struct FrameSampler<S: FrameSource> {
    source: S,
    stride: u32,
    index: u64,
    cancel: Option<CancelFlag>,
    done: bool,
}

impl<S: FrameSource> FrameSampler<S> {
    pub fn new(source: S, stride: u32) -> Result<Self, CaptureError> {
        if stride == 0 {
            return Err(CaptureError::Config("sampling stride must be > 0".to_string()));
        }

        Ok(Self {
            source,
            stride,
            index: 0,
            cancel: None,
            done: false,
        })
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Frames consumed from the source so far, sampled or not
    pub fn frames_read(&self) -> u64 {
        self.index
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().map_or(false, CancelFlag::is_cancelled)
    }
}

impl<S: FrameSource> Iterator for FrameSampler<S> {
    type Item = Result<(u64, Frame), CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done || self.cancelled() {
                self.done = true;
                return None;
            }

            let index = self.index;
            if is_sampled(index, self.stride) {
                match self.source.next_frame() {
                    Ok(Some(frame)) => {
                        self.index += 1;
                        return Some(Ok((index, frame)));
                    }
                    Ok(None) => {
                        self.done = true;
                        return None;
                    }
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                }
            }

            match self.source.skip_frame() {
                Ok(true) => self.index += 1,
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
