use parking_lot::{Condvar, Mutex};

use crate::errors::QueueError;

/// Counting semaphore used by [`BoundedQueue`](super::BoundedQueue) to admit
/// producers (free slots) and consumers (filled slots).
///
/// Closing the semaphore wakes every waiter; waiters and later callers get
/// [`QueueError::Destroyed`] instead of blocking forever.
pub(crate) struct Semaphore {
    state: Mutex<SemaphoreState>,
    available: Condvar,
}

struct SemaphoreState {
    permits: usize,
    closed: bool,
}

impl Semaphore {
    pub(crate) fn new(permits: usize) -> Self {
        Self {
            state: Mutex::new(SemaphoreState {
                permits,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Block until a permit is available and take it.
    pub(crate) fn acquire(&self) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(QueueError::Destroyed);
            }
            if state.permits > 0 {
                state.permits -= 1;
                return Ok(());
            }
            self.available.wait(&mut state);
        }
    }

    /// Return a permit and wake one waiter.
    pub(crate) fn release(&self) {
        let mut state = self.state.lock();
        state.permits += 1;
        drop(state);
        self.available.notify_one();
    }

    /// Close the semaphore. Returns false if it was already closed.
    pub(crate) fn close(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        drop(state);
        self.available.notify_all();
        true
    }

    pub(crate) fn permits(&self) -> usize {
        self.state.lock().permits
    }
}
