use tracing::error;

use super::buffer::CaptureBuffer;
use crate::error::RejectedBuffer;
use crate::pipeline::FilledProducer;

/// Hook the source calls on its delivery thread for every filled slot.
///
/// Only takes ownership, queues, and signals; pixel work stays on the consumer.
pub struct CaptureProducer {
    queue: FilledProducer,
    sequence: u64,
}

impl CaptureProducer {
    pub fn new(queue: FilledProducer) -> Self {
        Self { queue, sequence: 0 }
    }

    /// Stamp the slot with the next sequence number and queue it for display.
    ///
    /// A refused slot comes back in the error; the pipeline is already shutting down.
    pub fn on_buffer_filled(&mut self, mut buffer: CaptureBuffer) -> Result<(), RejectedBuffer> {
        self.sequence += 1;
        buffer.mark_filled(self.sequence);

        if let Err(e) = self.queue.enqueue_filled(buffer) {
            error!("Dropping delivered frame {}: {}", self.sequence, e);
            return Err(e);
        }
        Ok(())
    }

    /// Frames delivered so far.
    pub fn delivered(&self) -> u64 {
        self.sequence
    }
}
