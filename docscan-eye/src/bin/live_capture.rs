//! Live document capture from a camera
//!
//! Reads the configured camera, captures a still once a document lines up
//! with the target rectangle and archives captures after each cooldown.

use anyhow::Context;
use clap::Parser;
use docscan_core::DocscanConfig;
use docscan_eye::annotate::annotate;
use docscan_eye::detector::build_detector;
use docscan_eye::source::open_camera;
use docscan_eye::{CancelFlag, CaptureEngine, CaptureSession, FrameSource, Signal};
use std::path::PathBuf;
use std::time::Instant;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "live-capture", about = "Capture documents from a live camera feed")]
struct Args {
    /// Configuration file (JSON, TOML or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera index or device path, overrides the configuration
    #[arg(long)]
    camera: Option<String>,

    /// Write an annotated copy of each sampled frame to this path
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,
}

fn load_config(args: &Args) -> anyhow::Result<DocscanConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let path = path.to_str().context("configuration path is not UTF-8")?;
            DocscanConfig::from_file(path)?
        }
        None => DocscanConfig::default(),
    };
    config.apply_env();
    if let Some(camera) = &args.camera {
        config.capture.camera = camera.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .with_target(false)
        .init();

    let cancel = CancelFlag::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, stopping capture");
            on_signal.cancel();
        }
    });

    let worker = tokio::task::spawn_blocking(move || {
        run_capture(&config, args.preview.as_deref(), args.max_frames, &cancel)
    });

    match worker.await? {
        Ok(frames) => {
            info!("Capture finished after {} frames", frames);
            Ok(())
        }
        Err(e) => {
            error!("Capture stopped: {:#}", e);
            Err(e)
        }
    }
}

fn run_capture(
    config: &DocscanConfig,
    preview: Option<&std::path::Path>,
    max_frames: Option<u64>,
    cancel: &CancelFlag,
) -> anyhow::Result<u64> {
    let capture = &config.capture;
    let detector = build_detector(&config.detector, capture.document_class_id)?;
    let engine = CaptureEngine::from_config(capture)?;
    let mut source = open_camera(&capture.camera, capture.resolution)?;
    let mut session = CaptureSession::new();

    info!(
        "Watching camera {} (every {} frames, captures in {})",
        capture.camera,
        capture.stride,
        capture.output_dir.display()
    );

    let mut frames = 0u64;
    while !cancel.is_cancelled() {
        if max_frames.map_or(false, |max| frames >= max) {
            break;
        }
        frames += 1;

        if !engine.advance(&mut session) {
            if !source.skip_frame()? {
                break;
            }
            continue;
        }

        let Some(frame) = source.next_frame()? else {
            break;
        };

        let report = match engine.step(&mut session, &frame, detector.as_ref(), Instant::now()) {
            Ok(report) => report,
            Err(e) if e.is_frame_local() => {
                warn!("Frame {} dropped: {}", frame.index, e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(archive) = &report.archived {
            info!("Captures archived to {}", archive.display());
        }
        match &report.signal {
            Signal::Captured { outcome } => info!("{} {:?}", report.signal.message(), outcome),
            Signal::AlreadyCaptured { remaining } => {
                info!("{} {:.1}s until next capture", report.signal.message(), remaining.as_secs_f32())
            }
            other => info!("{}", other.message()),
        }

        if let Some(path) = preview {
            if let Some(image) = annotate(&frame, &report) {
                if let Err(e) = image.save(path) {
                    warn!("Failed to write preview {}: {}", path.display(), e);
                }
            }
        }
    }

    Ok(frames)
}
