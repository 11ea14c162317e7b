//! camblit: camera frames straight onto the Linux framebuffer

use std::path::PathBuf;

use camblit::capture::{FrameFormat, FrameSource, SyntheticSource, V4l2Source};
use camblit::display::{paint_gradient, DisplaySurface, FbDevSurface, MemorySurface};
use camblit::pipeline::{Pipeline, PipelineSettings};
use camblit::{utils, AppConfig, CaptureBackend};
use color_eyre::{eyre::eyre, Result};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "camblit=info".into()),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("camblit launching...");

    let config_path = std::env::var_os("CAMBLIT_CONFIG").map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;

    if config.display.device == "memory" {
        let surface = MemorySurface::new(config.display.width, config.display.height);
        run(config, surface).await
    } else {
        let surface = FbDevSurface::open(&config.display.device)?;
        run(config, surface).await
    }
}

async fn run<S: DisplaySurface + 'static>(config: AppConfig, mut surface: S) -> Result<()> {
    if config.display.paint_background {
        paint_gradient(&mut surface);
    }

    let source = open_source(&config)?;
    let settings = PipelineSettings::from_config(&config);
    let mut pipeline = Pipeline::start(source, surface, settings)?;

    let shutdown = pipeline.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, stopping");
                shutdown.shutdown();
            }
            Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
        }
    });

    let core = config.pipeline.consumer_core;
    let summary = tokio::task::spawn_blocking(move || {
        if let Some(core) = core {
            utils::pin_current_thread(core);
        }
        pipeline.run()
    })
    .await
    .map_err(|e| eyre!("Display loop panicked: {}", e))??;

    info!(
        "camblit shutting down: {} frames displayed, {} dropped, pool {}/{} accounted",
        summary.stats.displayed,
        summary.stats.dropped,
        summary.counts.total(),
        summary.pool_size
    );
    Ok(())
}

fn open_source(config: &AppConfig) -> Result<Box<dyn FrameSource>> {
    let capture = config.capture.clone();
    match capture.backend {
        CaptureBackend::Synthetic => Ok(Box::new(SyntheticSource::new(
            FrameFormat::rgb24(capture.width, capture.height),
            capture.fps,
        ))),
        CaptureBackend::V4l2 => {
            let mut capture = capture;
            if capture.device.is_empty() {
                capture.device = utils::auto_detect_device()?.path;
            }
            info!("Using capture device: {}", capture.device);
            Ok(Box::new(V4l2Source::open(capture)?))
        }
    }
}
