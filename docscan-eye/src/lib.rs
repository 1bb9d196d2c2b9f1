//! docscan-eye: frame sampling and capture decisions for document detection
//!
//! Frames come from a [`source::FrameSource`], are thinned out by the
//! [`sampler::FrameSampler`] (or a [`session::CaptureSession`] counter on the
//! live path), handed to a [`detector::Detector`], and the result is either
//! matched against a fixed target region ([`session::CaptureEngine`]) or cropped
//! out wholesale ([`batch::BatchScanner`]). Captured images are persisted and
//! archived by the [`writer::ArtifactWriter`].

pub mod annotate;
pub mod batch;
pub mod detector;
pub mod error;
pub mod frame;
pub mod policy;
pub mod sampler;
pub mod session;
pub mod source;
pub mod writer;

pub use batch::{BatchScanner, ScanOutcome};
pub use detector::{ClassFilter, Detector};
pub use error::CaptureError;
pub use frame::Frame;
pub use policy::{ClosenessPolicy, ContainmentPolicy, RegionPolicy};
pub use sampler::{CancelFlag, FrameSampler};
pub use session::{CaptureEngine, CaptureSession, CaptureStatus, Signal, StepReport};
pub use source::FrameSource;
pub use writer::{ArtifactWriter, SaveOutcome};
