//! Display loop: wait, dequeue, blit, release

use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::pool::FilledConsumer;
use crate::capture::BufferReturner;
use crate::display::{BlitPlan, DisplaySurface};
use crate::error::PipelineError;
use crate::telemetry::{FrameRateMeter, FrameRateReport};

/// Outcome of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A frame reached the surface.
    Displayed,
    /// The iteration produced nothing; the loop carries on.
    Dropped,
    /// The frame signal was closed.
    Shutdown,
}

/// Counters kept across the lifetime of the loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    pub displayed: u64,
    pub dropped: u64,
}

pub struct DisplayConsumer<S> {
    queue: FilledConsumer,
    returner: BufferReturner,
    surface: S,
    plan: BlitPlan,
    meter: FrameRateMeter,
    stats: ConsumerStats,
    last_report: Option<FrameRateReport>,
}

impl<S: DisplaySurface> DisplayConsumer<S> {
    pub fn new(
        queue: FilledConsumer,
        returner: BufferReturner,
        surface: S,
        plan: BlitPlan,
        meter: FrameRateMeter,
    ) -> Self {
        Self {
            queue,
            returner,
            surface,
            plan,
            meter,
            stats: ConsumerStats::default(),
            last_report: None,
        }
    }

    /// Run one Waiting → Processing → Waiting cycle.
    pub fn step(&mut self) -> Result<Step, PipelineError> {
        let start = Instant::now();

        if self.queue.wait().is_err() {
            if let Some(fault) = self.queue.fault() {
                error!("Capture side failed: {}", fault);
                return Err(fault.into());
            }
            return Ok(Step::Shutdown);
        }

        let buffer = match self.queue.dequeue_filled() {
            Ok(buffer) => buffer,
            Err(e) if !e.is_fatal() => {
                warn!("No frame after wakeup: {}", e);
                self.record_drop();
                return Ok(Step::Dropped);
            }
            Err(e) => return Err(e.into()),
        };

        let copy_start = Instant::now();
        let blitted = self.plan.blit(buffer.data(), self.surface.pixels_mut());
        let copy_time = copy_start.elapsed();
        metrics::histogram!("blit_time_us").record(copy_time.as_micros() as f64);

        let sequence = buffer.sequence;
        self.queue.release_to_producer(buffer, &self.returner)?;

        if let Err(e) = blitted {
            warn!("Skipping frame {}: {}", sequence, e);
            self.record_drop();
            return Ok(Step::Dropped);
        }

        self.stats.displayed += 1;
        metrics::counter!("frames_displayed").increment(1);

        let iteration = start.elapsed();
        metrics::histogram!("frame_time_us").record(iteration.as_micros() as f64);
        if let Some(report) = self.meter.record(iteration) {
            info!("frequency: {:.2}Hz", report.fps);
            metrics::gauge!("capture_fps").set(report.fps);
            self.last_report = Some(report);
        }

        Ok(Step::Displayed)
    }

    /// Loop until shutdown, a fatal error, or `max_frames` frames displayed.
    ///
    /// Whatever is still queued on exit goes back to the source.
    pub fn run(&mut self, max_frames: Option<u64>) -> Result<ConsumerStats, PipelineError> {
        let result = loop {
            if max_frames.is_some_and(|max| self.stats.displayed >= max) {
                debug!("Frame limit reached");
                break Ok(self.stats);
            }
            match self.step() {
                Ok(Step::Shutdown) => {
                    info!("Display loop shutting down");
                    break Ok(self.stats);
                }
                Ok(Step::Displayed | Step::Dropped) => {}
                Err(e) => break Err(e),
            }
        };

        self.return_queued();
        result
    }

    fn record_drop(&mut self) {
        self.stats.dropped += 1;
        metrics::counter!("frames_dropped").increment(1);
    }

    /// Hand every still-queued slot back to the source. Returns how many were queued.
    pub fn return_queued(&mut self) -> usize {
        let drained = self.queue.drain();
        let count = drained.len();
        for buffer in drained {
            let id = buffer.id();
            if let Err(e) = self.queue.release_to_producer(buffer, &self.returner) {
                debug!(id, "Could not return queued buffer: {}", e);
            }
        }
        count
    }

    pub fn queue(&self) -> &FilledConsumer {
        &self.queue
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    pub fn last_report(&self) -> Option<FrameRateReport> {
        self.last_report
    }
}
