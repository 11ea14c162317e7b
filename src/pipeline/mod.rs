//! Capture → display pipeline wiring

pub mod consumer;
pub mod pool;
pub mod signal;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

pub use consumer::{ConsumerStats, DisplayConsumer, Step};
pub use pool::{FilledConsumer, FilledProducer, FramePool, PoolCounts, DEFAULT_POOL_SIZE};
pub use signal::{Closed, FrameSignal};

use crate::capture::{CaptureProducer, FrameFormat, FrameSource};
use crate::display::{BlitPlan, DisplaySurface};
use crate::error::{ConfigError, PipelineError};
use crate::telemetry::FrameRateMeter;
use crate::AppConfig;

/// Wakes a parked display loop so it can wind down.
#[derive(Clone)]
pub struct ShutdownHandle {
    signal: Arc<FrameSignal>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.signal.close();
    }
}

/// What the pipeline needs to know before it starts.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub format: FrameFormat,
    pub pool_size: usize,
    pub report_interval: Duration,
    pub max_frames: Option<u64>,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            format: FrameFormat::rgb24(config.capture.width, config.capture.height),
            pool_size: config.capture.buffer_count,
            report_interval: Duration::from_millis(config.telemetry.report_interval_ms),
            max_frames: config.pipeline.max_frames,
        }
    }
}

/// Final accounting once the loop has exited and the source is stopped.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub stats: ConsumerStats,
    pub counts: PoolCounts,
    pub pool_size: usize,
}

/// A running source feeding a display loop.
pub struct Pipeline<S> {
    source: Box<dyn FrameSource>,
    consumer: DisplayConsumer<S>,
    shutdown: ShutdownHandle,
    max_frames: Option<u64>,
}

impl<S: DisplaySurface> Pipeline<S> {
    /// Check the geometry, allocate the pool, and start the source.
    #[instrument(skip_all, fields(pool = settings.pool_size))]
    pub fn start(
        mut source: Box<dyn FrameSource>,
        surface: S,
        settings: PipelineSettings,
    ) -> Result<Self, PipelineError> {
        if settings.pool_size < 2 {
            return Err(ConfigError::Invalid(format!(
                "need at least 2 buffers, got {}",
                settings.pool_size
            ))
            .into());
        }
        let plan = BlitPlan::new(&settings.format, surface.geometry())?;

        let pool = FramePool::new(settings.pool_size, settings.format);
        let (buffers, filled_tx, filled_rx) = pool.split();
        let shutdown = ShutdownHandle {
            signal: filled_rx.signal().clone(),
        };

        let returner = source.start(buffers, CaptureProducer::new(filled_tx))?;
        info!(
            "Pipeline started: {}x{} into {}x{}",
            plan.width(),
            plan.height(),
            surface.geometry().width,
            surface.geometry().height
        );

        let consumer = DisplayConsumer::new(
            filled_rx,
            returner,
            surface,
            plan,
            FrameRateMeter::new(settings.report_interval),
        );

        Ok(Self {
            source,
            consumer,
            shutdown,
            max_frames: settings.max_frames,
        })
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Drive the display loop on the calling thread, then stop the source.
    pub fn run(&mut self) -> Result<RunSummary, PipelineError> {
        let result = self.consumer.run(self.max_frames);
        let requested =
            self.shutdown.signal.is_closed() && self.consumer.queue().fault().is_none();

        // Unblock anything still parked on the signal before joining the source.
        self.shutdown.shutdown();
        if let Err(e) = self.source.stop() {
            warn!("Source did not stop cleanly: {}", e);
        }
        // The source may have queued more while it was winding down.
        let late = self.consumer.return_queued();
        if late > 0 {
            debug!(late, "Returned buffers queued during source stop");
        }

        let stats = result?;
        let summary = RunSummary {
            stats,
            counts: self.consumer.queue().counts(),
            pool_size: self.consumer.queue().size(),
        };
        info!(
            displayed = stats.displayed,
            dropped = stats.dropped,
            requested,
            "Pipeline stopped"
        );
        Ok(summary)
    }

    pub fn consumer(&self) -> &DisplayConsumer<S> {
        &self.consumer
    }
}
