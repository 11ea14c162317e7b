//! Counting frame signal between the capture producer and the display consumer

use parking_lot::{Condvar, Mutex};

/// Returned by a wait once the signal has been closed for shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Closed;

#[derive(Debug, Default)]
struct State {
    count: usize,
    closed: bool,
}

/// Condvar-backed counting semaphore with a shutdown path.
///
/// Every `signal()` is matched by exactly one successful wait. Once closed,
/// waiters return `Closed` even if frames are still pending; the owner drains
/// the queue during teardown.
#[derive(Debug, Default)]
pub struct FrameSignal {
    state: Mutex<State>,
    cond: Condvar,
}

impl FrameSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Producer side: announce one more available frame.
    pub fn signal(&self) {
        let mut state = self.state.lock();
        state.count += 1;
        drop(state);
        self.cond.notify_one();
    }

    /// Block until a frame is available, then take it.
    pub fn wait(&self) -> Result<(), Closed> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(Closed);
            }
            if state.count > 0 {
                state.count -= 1;
                return Ok(());
            }
            self.cond.wait(&mut state);
        }
    }

    /// Wake every waiter and make all later waits return `Closed`.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.cond.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Signals not yet matched by a wait.
    pub fn pending(&self) -> usize {
        self.state.lock().count
    }
}
