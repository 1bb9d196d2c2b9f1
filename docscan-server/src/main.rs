// docscan-server: upload a video, get back the document crops found in it

use anyhow::Context;
use clap::Parser;
use docscan_core::DocscanConfig;
use docscan_eye::detector::build_detector;
use docscan_eye::Detector;
use docscan_server::{create_router, ApiState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "docscan-server", about = "Document detection API for uploaded videos")]
struct Args {
    /// Configuration file (JSON, TOML or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address, overrides the configuration
    #[arg(long)]
    host: Option<String>,

    /// Port, overrides the configuration
    #[arg(short, long)]
    port: Option<u16>,
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
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
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
        .with_thread_ids(false)
        .init();

    info!("Starting docscan-server");

    // the blocking HTTP client must not be built on a runtime thread
    let detector_config = config.detector.clone();
    let class_id = config.capture.document_class_id;
    let detector: Arc<dyn Detector> =
        tokio::task::spawn_blocking(move || build_detector(&detector_config, class_id))
            .await??
            .into();
    info!("Detector ready ({:?})", config.detector.kind);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = ApiState::new(config, detector)?;
    info!(
        "Saving crops to {}",
        state.scanner.writer().output_dir().display()
    );
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await
        .context("HTTP server failed")?;

    info!("Server stopped");
    Ok(())
}

/// Wait for shutdown signal
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
