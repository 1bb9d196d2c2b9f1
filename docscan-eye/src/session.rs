//! Live capture decisions
//!
//! A [`CaptureSession`] holds the per-stream state; a [`CaptureEngine`] moves
//! it along one frame at a time:
//!
//! - searching: detect, compare the document box with the target region,
//!   save the frame and enter captured on a match;
//! - captured: report "already captured" without running detection until the
//!   cooldown window has passed;
//! - cooldown: archive pending captures, reset the session and evaluate the
//!   same frame as searching.

use crate::detector::Detector;
use crate::error::CaptureError;
use crate::frame::Frame;
use crate::policy::{policy_from_config, RegionPolicy};
use crate::sampler::is_sampled;
use crate::writer::{ArtifactWriter, SaveOutcome};
use docscan_core::{BoundingBox, CaptureConfig, TargetConfig, TargetRegion};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    Searching,
    Captured,
}

/// Capture state of one stream
#[derive(Debug, Clone)]
pub struct CaptureSession {
    status: CaptureStatus,
    capture_time: Option<Instant>,
    frame_counter: u64,
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSession {
    pub fn new() -> Self {
        Self {
            status: CaptureStatus::Searching,
            capture_time: None,
            frame_counter: 0,
        }
    }

    pub fn status(&self) -> CaptureStatus {
        self.status
    }

    pub fn is_captured(&self) -> bool {
        self.status == CaptureStatus::Captured
    }

    pub fn capture_time(&self) -> Option<Instant> {
        self.capture_time
    }

    /// Frames seen since the session started or last left cooldown
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn reset(&mut self) {
        self.status = CaptureStatus::Searching;
        self.capture_time = None;
        self.frame_counter = 0;
    }

    fn enter_captured(&mut self, now: Instant) {
        self.status = CaptureStatus::Captured;
        self.capture_time = Some(now);
    }
}

/// What a step decided, as a UI would show it
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// Not a sampling boundary; the frame was not looked at
    Skipped,
    NotDetected,
    AdjustPosition,
    Captured { outcome: SaveOutcome },
    /// A match was found but nothing could be saved and strict capture kept the session searching
    BufferFull,
    AlreadyCaptured { remaining: Duration },
}

impl Signal {
    pub fn message(&self) -> &'static str {
        match self {
            Signal::Skipped => "",
            Signal::NotDetected => "Document Not Detected!!",
            Signal::AdjustPosition => "Adjust document in the rectangle",
            Signal::Captured { .. } => "Document Detected!! Capturing...",
            Signal::BufferFull => "Storage full, waiting for pending captures to be archived",
            Signal::AlreadyCaptured { .. } => "Captured!",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub signal: Signal,
    /// Target region for the frame's shape; `None` for skipped frames
    pub target: Option<TargetRegion>,
    /// Document box the decision was based on
    pub detection: Option<BoundingBox>,
    /// Archive directory when this step ran the cooldown flush
    pub archived: Option<PathBuf>,
}

impl StepReport {
    fn skipped() -> Self {
        Self::new(Signal::Skipped, None)
    }

    fn new(signal: Signal, target: Option<TargetRegion>) -> Self {
        Self {
            signal,
            target,
            detection: None,
            archived: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub stride: u32,
    pub target: TargetConfig,
    pub cooldown: Duration,
    /// Stay searching when a capture hits a full buffer
    pub strict_capture: bool,
    pub document_class_id: usize,
}

impl From<&CaptureConfig> for CaptureSettings {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            stride: config.stride,
            target: config.target.clone(),
            cooldown: Duration::from_secs(config.cooldown_secs),
            strict_capture: config.strict_capture,
            document_class_id: config.document_class_id,
        }
    }
}

pub struct CaptureEngine {
    settings: CaptureSettings,
    policy: Box<dyn RegionPolicy>,
    writer: ArtifactWriter,
}

impl CaptureEngine {
    pub fn new(settings: CaptureSettings, policy: Box<dyn RegionPolicy>, writer: ArtifactWriter) -> Self {
        Self {
            settings,
            policy,
            writer,
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Result<Self, CaptureError> {
        if config.stride == 0 {
            return Err(CaptureError::Config("capture.stride must be > 0".to_string()));
        }
        let writer = ArtifactWriter::new(&config.output_dir, config.buffer_cap)?;
        Ok(Self::new(config.into(), policy_from_config(config), writer))
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn writer(&self) -> &ArtifactWriter {
        &self.writer
    }

    /// Count a new frame; true when it falls on a sampling boundary
    pub fn advance(&self, session: &mut CaptureSession) -> bool {
        session.frame_counter += 1;
        is_sampled(session.frame_counter - 1, self.settings.stride)
    }

    /// Count the frame and decide on it if it is sampled
    pub fn on_frame(
        &self,
        session: &mut CaptureSession,
        frame: &Frame,
        detector: &dyn Detector,
        now: Instant,
    ) -> Result<StepReport, CaptureError> {
        if !self.advance(session) {
            return Ok(StepReport::skipped());
        }
        self.step(session, frame, detector, now)
    }

    /// Decide on a sampled frame
    pub fn step(
        &self,
        session: &mut CaptureSession,
        frame: &Frame,
        detector: &dyn Detector,
        now: Instant,
    ) -> Result<StepReport, CaptureError> {
        let target = TargetRegion::from_shape(frame.height, frame.width, &self.settings.target);
        let mut archived = None;

        if session.is_captured() {
            let captured_at = *session.capture_time.get_or_insert(now);
            let elapsed = now.saturating_duration_since(captured_at);
            if elapsed <= self.settings.cooldown {
                let remaining = self.settings.cooldown - elapsed;
                return Ok(StepReport::new(Signal::AlreadyCaptured { remaining }, Some(target)));
            }

            archived = self.writer.flush()?;
            session.reset();
            info!("Cooldown over, back to searching");
        }

        let documents: Vec<BoundingBox> = detector
            .detect(frame)?
            .into_iter()
            .filter(|b| b.class_id == self.settings.document_class_id)
            .collect();

        let mut report = StepReport::new(Signal::NotDetected, Some(target));
        report.archived = archived;

        let Some(first) = documents.first() else {
            debug!("Frame {}: no document", frame.index);
            return Ok(report);
        };

        let Some(matched) = documents.iter().find(|b| self.policy.accepts(&target, b)) else {
            debug!("Frame {}: document {} off target", frame.index, first);
            report.signal = Signal::AdjustPosition;
            report.detection = Some(first.clone());
            return Ok(report);
        };

        report.detection = Some(matched.clone());
        let outcome = self.writer.save(frame, None)?;
        if outcome == SaveOutcome::BufferFull && self.settings.strict_capture {
            warn!("Frame {}: buffer full, staying in search", frame.index);
            report.signal = Signal::BufferFull;
            return Ok(report);
        }

        session.enter_captured(now);
        info!("Frame {}: document captured ({:?})", frame.index, outcome);
        report.signal = Signal::Captured { outcome };
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::MockDetector;
    use crate::policy::ClosenessPolicy;
    use tempfile::TempDir;

    const W: u32 = 640;
    const H: u32 = 480;

    fn engine(dir: &TempDir, cap: usize, strict: bool) -> CaptureEngine {
        let settings = CaptureSettings {
            stride: 5,
            target: TargetConfig::default(),
            cooldown: Duration::from_secs(5),
            strict_capture: strict,
            document_class_id: 0,
        };
        let writer = ArtifactWriter::new(dir.path(), cap).unwrap();
        CaptureEngine::new(settings, Box::new(ClosenessPolicy::default()), writer)
    }

    fn on_target() -> BoundingBox {
        TargetRegion::from_shape(H, W, &TargetConfig::default()).to_box(0, "document")
    }

    fn frame() -> Frame {
        Frame::filled(W, H, [200, 200, 200], 0)
    }

    #[test]
    fn test_advance_samples_every_fifth() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, 10, false);
        let mut session = CaptureSession::new();
        let sampled: Vec<bool> = (0..10).map(|_| engine.advance(&mut session)).collect();
        assert_eq!(
            sampled,
            vec![false, false, false, false, true, false, false, false, false, true]
        );
    }

    #[test]
    fn test_skipped_frames_never_reach_detector() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, 10, false);
        let mut mock = MockDetector::new();
        mock.expect_detect().times(1).returning(|_| Ok(vec![]));

        let mut session = CaptureSession::new();
        let now = Instant::now();
        for _ in 0..4 {
            let report = engine.on_frame(&mut session, &frame(), &mock, now).unwrap();
            assert_eq!(report.signal, Signal::Skipped);
            assert!(report.target.is_none());
        }
        let report = engine.on_frame(&mut session, &frame(), &mock, now).unwrap();
        assert_eq!(report.signal, Signal::NotDetected);
    }

    #[test]
    fn test_off_target_asks_to_adjust() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, 10, false);
        let mut mock = MockDetector::new();
        mock.expect_detect()
            .returning(|_| Ok(vec![BoundingBox::new(10.0, 10.0, 50.0, 50.0, 0, "document")]));

        let mut session = CaptureSession::new();
        let report = engine.step(&mut session, &frame(), &mock, Instant::now()).unwrap();
        assert_eq!(report.signal, Signal::AdjustPosition);
        assert_eq!(report.detection.unwrap().xmin, 10.0);
        assert_eq!(session.status(), CaptureStatus::Searching);
    }

    #[test]
    fn test_other_classes_ignored() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, 10, false);
        let mut mock = MockDetector::new();
        mock.expect_detect().returning(|_| {
            let mut face = on_target();
            face.class_id = 1;
            Ok(vec![face])
        });

        let mut session = CaptureSession::new();
        let report = engine.step(&mut session, &frame(), &mock, Instant::now()).unwrap();
        assert_eq!(report.signal, Signal::NotDetected);
    }

    #[test]
    fn test_any_matching_box_captures() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, 10, false);
        let mut mock = MockDetector::new();
        mock.expect_detect().returning(|_| {
            Ok(vec![
                BoundingBox::new(0.0, 0.0, 5.0, 5.0, 0, "document"),
                on_target(),
            ])
        });

        let mut session = CaptureSession::new();
        let report = engine.step(&mut session, &frame(), &mock, Instant::now()).unwrap();
        assert!(matches!(
            report.signal,
            Signal::Captured { outcome: SaveOutcome::Saved(_) }
        ));
        assert_eq!(report.detection, Some(on_target()));
        assert!(session.is_captured());
        assert_eq!(engine.writer().pending_count().unwrap(), 1);
    }

    #[test]
    fn test_buffer_full_still_captures() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, 0, false);
        let mut mock = MockDetector::new();
        mock.expect_detect().returning(|_| Ok(vec![on_target()]));

        let mut session = CaptureSession::new();
        let report = engine.step(&mut session, &frame(), &mock, Instant::now()).unwrap();
        assert_eq!(
            report.signal,
            Signal::Captured { outcome: SaveOutcome::BufferFull }
        );
        assert!(session.is_captured());
        assert_eq!(engine.writer().pending_count().unwrap(), 0);
    }

    #[test]
    fn test_strict_capture_stays_searching_when_full() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, 0, true);
        let mut mock = MockDetector::new();
        mock.expect_detect().returning(|_| Ok(vec![on_target()]));

        let mut session = CaptureSession::new();
        let report = engine.step(&mut session, &frame(), &mock, Instant::now()).unwrap();
        assert_eq!(session.status(), CaptureStatus::Searching);
        assert_eq!(report.signal, Signal::BufferFull);
        assert_ne!(report.signal.message(), "Document Detected!! Capturing...");
        assert_eq!(report.detection, Some(on_target()));
    }

    #[test]
    fn test_failed_archive_keeps_session_captured() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, 10, false);
        let mut mock = MockDetector::new();
        mock.expect_detect().returning(|_| Ok(vec![on_target()]));

        let mut session = CaptureSession::new();
        let t0 = Instant::now();
        engine.step(&mut session, &frame(), &mock, t0).unwrap();
        assert!(session.is_captured());

        std::fs::remove_dir_all(dir.path()).unwrap();
        let result = engine.step(&mut session, &frame(), &mock, t0 + Duration::from_secs(6));
        assert!(matches!(result, Err(CaptureError::Io(_))));
        assert!(session.is_captured());
        assert_eq!(session.capture_time(), Some(t0));

        // once the directory is back the cooldown completes
        std::fs::create_dir_all(dir.path()).unwrap();
        let t1 = t0 + Duration::from_secs(7);
        let report = engine.step(&mut session, &frame(), &mock, t1).unwrap();
        assert!(matches!(report.signal, Signal::Captured { .. }));
        assert_eq!(session.capture_time(), Some(t1));
    }

    #[test]
    fn test_detector_error_propagates() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, 10, false);
        let mut mock = MockDetector::new();
        mock.expect_detect()
            .returning(|_| Err(CaptureError::DetectorInvocation("boom".to_string())));

        let mut session = CaptureSession::new();
        let err = engine.step(&mut session, &frame(), &mock, Instant::now()).unwrap_err();
        assert!(err.is_frame_local());
        assert_eq!(session.status(), CaptureStatus::Searching);
    }

    #[test]
    fn test_signal_messages() {
        assert_eq!(Signal::NotDetected.message(), "Document Not Detected!!");
        assert_eq!(
            Signal::AlreadyCaptured { remaining: Duration::ZERO }.message(),
            "Captured!"
        );
    }
}
