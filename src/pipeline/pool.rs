//! Fixed frame pool and the lock-free filled-frame queue

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::debug;

use super::signal::{Closed, FrameSignal};
use crate::capture::{BufferReturner, CaptureBuffer, FrameFormat};
use crate::error::{PipelineError, PoolError, RejectedBuffer};

/// Default number of frame slots. Two is the minimum for overlap, more adds latency.
pub const DEFAULT_POOL_SIZE: usize = 3;

/// Where each slot currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolCounts {
    pub at_source: usize,
    pub queued: usize,
    pub consuming: usize,
}

impl PoolCounts {
    pub fn total(&self) -> usize {
        self.at_source + self.queued + self.consuming
    }
}

/// Ownership ledger for every slot in the pool.
struct Ledger {
    size: usize,
    at_source: AtomicUsize,
    queued: AtomicUsize,
    consuming: AtomicUsize,
    /// Per-slot flag, set while the consumer holds the slot.
    held: Box<[AtomicBool]>,
    enqueued_total: AtomicU64,
    released_total: AtomicU64,
    /// First fatal error seen on the producer side.
    fault: Mutex<Option<PoolError>>,
}

impl Ledger {
    fn new(size: usize) -> Self {
        Self {
            size,
            at_source: AtomicUsize::new(size),
            queued: AtomicUsize::new(0),
            consuming: AtomicUsize::new(0),
            held: (0..size).map(|_| AtomicBool::new(false)).collect(),
            enqueued_total: AtomicU64::new(0),
            released_total: AtomicU64::new(0),
            fault: Mutex::new(None),
        }
    }

    fn check_id(&self, id: usize) -> Result<(), PoolError> {
        if id < self.size {
            Ok(())
        } else {
            Err(PoolError::UnknownBuffer { id })
        }
    }

    fn on_enqueue(&self) {
        self.at_source.fetch_sub(1, Ordering::AcqRel);
        self.queued.fetch_add(1, Ordering::AcqRel);
        self.enqueued_total.fetch_add(1, Ordering::Relaxed);
    }

    fn undo_enqueue(&self) {
        self.queued.fetch_sub(1, Ordering::AcqRel);
        self.at_source.fetch_add(1, Ordering::AcqRel);
        self.enqueued_total.fetch_sub(1, Ordering::Relaxed);
    }

    fn on_dequeue(&self, id: usize) {
        self.held[id].store(true, Ordering::Release);
        self.queued.fetch_sub(1, Ordering::AcqRel);
        self.consuming.fetch_add(1, Ordering::AcqRel);
    }

    fn on_release(&self, id: usize) -> Result<(), PoolError> {
        self.check_id(id)?;
        if !self.held[id].swap(false, Ordering::AcqRel) {
            return Err(PoolError::DoubleRelease { id });
        }
        self.consuming.fetch_sub(1, Ordering::AcqRel);
        self.at_source.fetch_add(1, Ordering::AcqRel);
        self.released_total.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn counts(&self) -> PoolCounts {
        PoolCounts {
            at_source: self.at_source.load(Ordering::Acquire),
            queued: self.queued.load(Ordering::Acquire),
            consuming: self.consuming.load(Ordering::Acquire),
        }
    }
}

/// A fixed set of pre-allocated capture slots.
pub struct FramePool {
    buffers: Vec<CaptureBuffer>,
    format: FrameFormat,
}

impl FramePool {
    pub fn new(size: usize, format: FrameFormat) -> Self {
        debug!(
            size,
            bytes_per_slot = format.capacity(),
            "Allocating frame pool"
        );
        let buffers = (0..size).map(|id| CaptureBuffer::new(id, format)).collect();
        Self { buffers, format }
    }

    pub fn size(&self) -> usize {
        self.buffers.len()
    }

    pub fn format(&self) -> &FrameFormat {
        &self.format
    }

    /// Split into the slots handed to the source and the two ends of the filled queue.
    ///
    /// All slots start out owned by the source, which keeps its own free list.
    pub fn split(self) -> (Vec<CaptureBuffer>, FilledProducer, FilledConsumer) {
        let size = self.buffers.len();
        let ledger = Arc::new(CachePadded::new(Ledger::new(size)));
        let signal = Arc::new(FrameSignal::new());
        let (ring_prod, ring_cons) = HeapRb::<CaptureBuffer>::new(size.max(1)).split();

        let producer = FilledProducer {
            ring: ring_prod,
            signal: signal.clone(),
            ledger: ledger.clone(),
        };
        let consumer = FilledConsumer {
            ring: ring_cons,
            signal,
            ledger,
        };
        (self.buffers, producer, consumer)
    }
}

/// Producer end of the filled queue, owned by the source's delivery context.
pub struct FilledProducer {
    ring: HeapProd<CaptureBuffer>,
    signal: Arc<FrameSignal>,
    ledger: Arc<CachePadded<Ledger>>,
}

impl FilledProducer {
    /// Queue a filled slot and wake the consumer. Never blocks, never allocates.
    ///
    /// Any failure is fatal: the fault is recorded, the signal closed, and the
    /// slot handed back inside the error.
    pub fn enqueue_filled(&mut self, buffer: CaptureBuffer) -> Result<(), RejectedBuffer> {
        let id = buffer.id();
        if let Err(error) = self.ledger.check_id(id) {
            return Err(self.fail(buffer, error));
        }

        self.ledger.on_enqueue();
        if let Err(buffer) = self.ring.try_push(buffer) {
            self.ledger.undo_enqueue();
            return Err(self.fail(buffer, PoolError::QueueFull { id }));
        }
        self.signal.signal();
        Ok(())
    }

    fn fail(&self, buffer: CaptureBuffer, error: PoolError) -> RejectedBuffer {
        self.ledger.fault.lock().get_or_insert(error);
        self.signal.close();
        RejectedBuffer { buffer, error }
    }

    pub fn counts(&self) -> PoolCounts {
        self.ledger.counts()
    }
}

/// Consumer end of the filled queue, owned by the display loop.
pub struct FilledConsumer {
    ring: HeapCons<CaptureBuffer>,
    signal: Arc<FrameSignal>,
    ledger: Arc<CachePadded<Ledger>>,
}

impl FilledConsumer {
    /// Park until the producer has signalled a frame.
    pub fn wait(&self) -> Result<(), Closed> {
        self.signal.wait()
    }

    /// Pop the oldest filled slot. Only valid after a successful `wait`.
    pub fn dequeue_filled(&mut self) -> Result<CaptureBuffer, PoolError> {
        let buffer = self.ring.try_pop().ok_or(PoolError::EmptyQueue)?;
        self.ledger.on_dequeue(buffer.id());
        Ok(buffer)
    }

    /// Hand a consumed slot back to the source for refilling.
    pub fn release_to_producer(
        &self,
        buffer: CaptureBuffer,
        returner: &BufferReturner,
    ) -> Result<(), PipelineError> {
        let id = buffer.id();
        self.ledger.on_release(id)?;
        returner.release(buffer).map_err(|err| {
            debug!(id, "Source gone while releasing buffer");
            PipelineError::from(err)
        })
    }

    /// Take every slot still queued, bypassing the signal. Used during teardown.
    pub fn drain(&mut self) -> Vec<CaptureBuffer> {
        let mut drained = Vec::with_capacity(self.ring.occupied_len());
        while let Some(buffer) = self.ring.try_pop() {
            self.ledger.on_dequeue(buffer.id());
            drained.push(buffer);
        }
        drained
    }

    /// The producer-side error that closed the signal, if any.
    pub fn fault(&self) -> Option<PoolError> {
        *self.ledger.fault.lock()
    }

    pub fn signal(&self) -> &Arc<FrameSignal> {
        &self.signal
    }

    pub fn queued(&self) -> usize {
        self.ring.occupied_len()
    }

    pub fn counts(&self) -> PoolCounts {
        self.ledger.counts()
    }

    pub fn size(&self) -> usize {
        self.ledger.size
    }

    /// (enqueued, released) totals since the pool was split.
    pub fn totals(&self) -> (u64, u64) {
        (
            self.ledger.enqueued_total.load(Ordering::Relaxed),
            self.ledger.released_total.load(Ordering::Relaxed),
        )
    }
}
