//! Paced test-pattern source for headless runs

use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::buffer::{CaptureBuffer, FrameFormat};
use super::producer::CaptureProducer;
use super::source::{BufferReturner, Delivery, FrameSource};
use crate::error::SourceError;

/// Generates a scrolling colour pattern at a fixed frame rate.
pub struct SyntheticSource {
    format: FrameFormat,
    frame_interval: Duration,
    frame_limit: Option<u64>,
    delivery: Option<Delivery>,
}

impl SyntheticSource {
    pub fn new(format: FrameFormat, fps: u32) -> Self {
        Self {
            format,
            frame_interval: Duration::from_secs(1) / fps.max(1),
            frame_limit: None,
            delivery: None,
        }
    }

    /// Stop delivering after `frames` frames.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Deliver as fast as buffers come back.
    pub fn unpaced(mut self) -> Self {
        self.frame_interval = Duration::ZERO;
        self
    }
}

/// Pixel (x, y) of frame `n`: each channel is a different ramp so channel order is visible.
pub fn pattern_pixel(x: u32, y: u32, n: u64) -> [u8; 3] {
    let shift = n as u32;
    [
        (x.wrapping_add(shift) & 0xff) as u8,
        (y & 0xff) as u8,
        ((x ^ y).wrapping_add(shift) & 0xff) as u8,
    ]
}

fn paint(buffer: &mut CaptureBuffer, n: u64) {
    let format = *buffer.format();
    for (y, row) in buffer
        .data_mut()
        .chunks_mut(format.stride)
        .take(format.height as usize)
        .enumerate()
    {
        for (x, px) in row[..format.row_bytes()].chunks_exact_mut(3).enumerate() {
            px.copy_from_slice(&pattern_pixel(x as u32, y as u32, n));
        }
    }
}

impl FrameSource for SyntheticSource {
    fn start(
        &mut self,
        buffers: Vec<CaptureBuffer>,
        mut producer: CaptureProducer,
    ) -> Result<BufferReturner, SourceError> {
        if self.delivery.as_ref().is_some_and(Delivery::is_running) {
            return Err(SourceError::AlreadyStarted);
        }

        let (returner, free) = BufferReturner::channel(buffers.len());
        for buffer in buffers {
            returner.release(buffer)?;
        }

        info!(
            "Synthetic source: {}x{} every {:?}",
            self.format.width, self.format.height, self.frame_interval
        );

        let interval = self.frame_interval;
        let limit = self.frame_limit;
        let delivery = Delivery::spawn("synthetic-source", &returner, free, move |free| {
            let mut next_due = Instant::now();
            let mut produced = 0u64;

            while limit.map_or(true, |l| produced < l) {
                let Some(mut buffer) = free.next() else {
                    break;
                };

                let now = Instant::now();
                if next_due > now {
                    std::thread::sleep(next_due - now);
                }
                next_due += interval;
                if free.stopping() {
                    break;
                }

                paint(&mut buffer, produced);
                produced += 1;
                if let Err(rejected) = producer.on_buffer_filled(buffer) {
                    free.put_back(rejected.buffer);
                    break;
                }
            }
            debug!(produced, "Synthetic source finished");

            // Keep taking slots back until stopped so late releases still land.
            while free.next().is_some() {}
        })?;

        self.delivery = Some(delivery);
        Ok(returner)
    }

    fn stop(&mut self) -> Result<(), SourceError> {
        match self.delivery.take() {
            Some(mut delivery) => delivery.stop(),
            None => Ok(()),
        }
    }
}
