//! Hardware source abstraction and the buffer hand-back path

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use super::buffer::CaptureBuffer;
use super::producer::CaptureProducer;
use crate::error::SourceError;

/// How often a delivery thread parked on its free list rechecks the stop flag.
pub const FREE_LIST_POLL: Duration = Duration::from_millis(100);

/// A hardware image source that fills pool slots and hands them to a producer.
pub trait FrameSource: Send {
    /// Take ownership of every pool slot and start delivering into `producer`.
    ///
    /// Returns the path the consumer uses to give slots back for refilling.
    fn start(
        &mut self,
        buffers: Vec<CaptureBuffer>,
        producer: CaptureProducer,
    ) -> Result<BufferReturner, SourceError>;

    /// Stop delivery and wait for the delivery context to wind down.
    fn stop(&mut self) -> Result<(), SourceError>;
}

/// Consumer-side handle returning slots to the source's free list.
#[derive(Clone)]
pub struct BufferReturner {
    tx: Sender<CaptureBuffer>,
}

impl BufferReturner {
    /// A return path plus the free list the source pulls from.
    pub fn channel(capacity: usize) -> (Self, Receiver<CaptureBuffer>) {
        let (tx, rx) = flume::bounded(capacity);
        (Self { tx }, rx)
    }

    pub fn release(&self, buffer: CaptureBuffer) -> Result<(), SourceError> {
        self.tx.send(buffer).map_err(|_| SourceError::Disconnected)
    }
}

/// Running delivery thread shared by the concrete sources.
pub(crate) struct Delivery {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Delivery {
    /// Spawn `body` on a named thread with the source's free list.
    pub(crate) fn spawn<F>(
        name: &str,
        returner: &BufferReturner,
        free: Receiver<CaptureBuffer>,
        body: F,
    ) -> Result<Self, SourceError>
    where
        F: FnOnce(FreeList) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let free = FreeList {
            rx: free,
            returner: returner.clone(),
            stop: stop.clone(),
        };
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(free))?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub(crate) fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub(crate) fn stop(&mut self) -> Result<(), SourceError> {
        self.stop.store(true, Ordering::Release);
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| SourceError::ThreadPanicked),
            None => Ok(()),
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Delivery thread ended badly: {}", e);
        }
    }
}

/// The source's own pool of empty slots.
pub(crate) struct FreeList {
    rx: Receiver<CaptureBuffer>,
    returner: BufferReturner,
    stop: Arc<AtomicBool>,
}

impl FreeList {
    /// Next empty slot, or `None` once the source is stopping.
    pub(crate) fn next(&self) -> Option<CaptureBuffer> {
        loop {
            if self.stop.load(Ordering::Acquire) {
                return None;
            }
            match self.rx.recv_timeout(FREE_LIST_POLL) {
                Ok(buffer) => return Some(buffer),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Free list disconnected");
                    return None;
                }
            }
        }
    }

    /// Requeue a slot the filled queue refused, so it is not lost.
    pub(crate) fn put_back(&self, buffer: CaptureBuffer) {
        let id = buffer.id();
        if self.returner.tx.try_send(buffer).is_err() {
            warn!(id, "Free list full, dropping slot");
        }
    }

    pub(crate) fn stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}
