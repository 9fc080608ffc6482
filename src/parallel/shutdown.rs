//! Sentinel based shutdown of a worker stage.
//!
//! A stage is stopped by enqueuing exactly one sentinel per worker after the
//! last real item. Each worker that takes a sentinel returns without another
//! `get` and without forwarding it, so every worker sees exactly one.
//!
//! ```text
//!   RUNNING ──drain()──▶ DRAINING ──last worker stopped / finish()──▶ STOPPED
//! ```
//!
//! The stage that feeds a downstream queue must be `STOPPED` (all of its
//! workers joined) before the downstream stage is drained; otherwise a real
//! item could land behind a sentinel and never be serviced.

use parking_lot::Mutex;
use std::fmt;

use super::queue::BoundedQueue;
use crate::errors::{LookupError, Result};

/// Reserved text that marks "no more work". The item source guarantees it
/// never appears as a real item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentinel(String);

impl Sentinel {
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.is_empty() {
            return Err(LookupError::config("sentinel", "sentinel text must not be empty"));
        }
        Ok(Self(text))
    }

    pub fn is(&self, item: &str) -> bool {
        self.0 == item
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Sentinel {
    fn default() -> Self {
        // Braces are not legal in host names
        Self("{END}".to_string())
    }
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Running,
    Draining,
    Stopped,
}

/// Shutdown bookkeeping for one stage.
pub struct StageShutdown {
    name: &'static str,
    progress: Mutex<Progress>,
}

#[derive(Debug, Clone, Copy)]
struct Progress {
    workers: usize,
    state: StageState,
    sentinels_sent: usize,
    workers_stopped: usize,
}

impl StageShutdown {
    pub fn new(name: &'static str, workers: usize) -> Self {
        Self {
            name,
            progress: Mutex::new(Progress {
                workers,
                state: StageState::Running,
                sentinels_sent: 0,
                workers_stopped: 0,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn workers(&self) -> usize {
        self.progress.lock().workers
    }

    /// Record that only `started` of the planned workers came up, so exactly
    /// that many sentinels are enqueued. Only valid while `RUNNING`.
    pub fn retain_started(&self, started: usize) -> Result<()> {
        let mut progress = self.progress.lock();
        if progress.state != StageState::Running || started > progress.workers {
            return Err(LookupError::Resource(format!(
                "{} stage cannot shrink from {} to {} workers while {:?}",
                self.name, progress.workers, started, progress.state
            )));
        }
        progress.workers = started;
        Ok(())
    }

    pub fn state(&self) -> StageState {
        self.progress.lock().state
    }

    pub fn sentinels_sent(&self) -> usize {
        self.progress.lock().sentinels_sent
    }

    /// Number of workers that consumed a sentinel and returned.
    pub fn workers_stopped(&self) -> usize {
        self.progress.lock().workers_stopped
    }

    /// Enqueue one sentinel per worker into `queue`. Allowed once, from
    /// `RUNNING`; blocks while the queue is full.
    pub fn drain(&self, queue: &BoundedQueue, sentinel: &Sentinel) -> Result<()> {
        let workers = {
            let mut progress = self.progress.lock();
            if progress.state != StageState::Running {
                return Err(LookupError::Resource(format!(
                    "{} stage already {:?}; refusing to enqueue more sentinels",
                    self.name, progress.state
                )));
            }
            progress.state = if progress.workers == 0 {
                StageState::Stopped
            } else {
                StageState::Draining
            };
            progress.workers
        };

        tracing::debug!(stage = self.name, count = workers, queue = queue.name(), "enqueuing sentinels");
        for _ in 0..workers {
            queue.put(sentinel.as_str())?;
            self.progress.lock().sentinels_sent += 1;
        }
        Ok(())
    }

    /// Drain this stage only once `upstream` has stopped, so no real item can
    /// follow the sentinels.
    pub fn drain_after(
        &self,
        upstream: &StageShutdown,
        queue: &BoundedQueue,
        sentinel: &Sentinel,
    ) -> Result<()> {
        if upstream.state() != StageState::Stopped {
            return Err(LookupError::Resource(format!(
                "{} stage cannot drain while {} stage is {:?}",
                self.name,
                upstream.name,
                upstream.state()
            )));
        }
        self.drain(queue, sentinel)
    }

    /// Called by a worker right after it takes a sentinel.
    pub fn worker_stopped(&self) -> StageState {
        let mut progress = self.progress.lock();
        debug_assert!(
            progress.state != StageState::Running,
            "sentinel consumed before the stage was drained"
        );
        progress.workers_stopped += 1;
        if progress.workers_stopped >= progress.workers {
            progress.state = StageState::Stopped;
        }
        progress.state
    }

    /// Mark the stage stopped once the owner has joined every worker,
    /// including any that exited without reaching a sentinel.
    pub fn finish(&self) {
        let mut progress = self.progress.lock();
        if progress.workers_stopped != progress.workers {
            tracing::warn!(
                stage = self.name,
                stopped = progress.workers_stopped,
                workers = progress.workers,
                "stage finished with workers that never consumed a sentinel"
            );
        }
        progress.state = StageState::Stopped;
    }
}

impl fmt::Debug for StageShutdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let progress = *self.progress.lock();
        f.debug_struct("StageShutdown")
            .field("name", &self.name)
            .field("workers", &progress.workers)
            .field("state", &progress.state)
            .field("sentinels_sent", &progress.sentinels_sent)
            .field("workers_stopped", &progress.workers_stopped)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_rejects_empty_text() {
        assert!(Sentinel::new("").is_err());
        let sentinel = Sentinel::new("<<stop>>").unwrap();
        assert!(sentinel.is("<<stop>>"));
        assert!(!sentinel.is("stop"));
        assert_eq!(Sentinel::default().as_str(), "{END}");
    }

    #[test]
    fn test_drain_enqueues_one_sentinel_per_worker() {
        let queue = BoundedQueue::new("hosts", 8, 16).unwrap();
        let stage = StageShutdown::new("resolver", 3);
        stage.drain(&queue, &Sentinel::default()).unwrap();

        assert_eq!(stage.state(), StageState::Draining);
        assert_eq!(stage.sentinels_sent(), 3);
        assert_eq!(queue.try_get_count(), 3);

        let mut out = String::new();
        for expected in [StageState::Draining, StageState::Draining, StageState::Stopped] {
            queue.get(&mut out).unwrap();
            assert!(Sentinel::default().is(&out));
            assert_eq!(stage.worker_stopped(), expected);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_twice_is_rejected() {
        let queue = BoundedQueue::new("files", 8, 16).unwrap();
        let stage = StageShutdown::new("requester", 2);
        stage.drain(&queue, &Sentinel::default()).unwrap();
        assert!(stage.drain(&queue, &Sentinel::default()).is_err());
        assert_eq!(queue.try_get_count(), 2);
    }

    #[test]
    fn test_zero_workers_stop_immediately() {
        let queue = BoundedQueue::new("files", 1, 16).unwrap();
        let stage = StageShutdown::new("requester", 0);
        stage.drain(&queue, &Sentinel::default()).unwrap();
        assert_eq!(stage.state(), StageState::Stopped);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_downstream_waits_for_upstream() {
        let files = BoundedQueue::new("files", 4, 16).unwrap();
        let hosts = BoundedQueue::new("hosts", 4, 16).unwrap();
        let requesters = StageShutdown::new("requester", 1);
        let resolvers = StageShutdown::new("resolver", 2);
        let sentinel = Sentinel::default();

        assert!(resolvers.drain_after(&requesters, &hosts, &sentinel).is_err());
        assert_eq!(resolvers.state(), StageState::Running);

        requesters.drain(&files, &sentinel).unwrap();
        assert!(resolvers.drain_after(&requesters, &hosts, &sentinel).is_err());

        requesters.finish();
        resolvers.drain_after(&requesters, &hosts, &sentinel).unwrap();
        assert_eq!(hosts.try_get_count(), 2);
    }

    #[test]
    fn test_retain_started_limits_sentinels() {
        let queue = BoundedQueue::new("hosts", 8, 16).unwrap();
        let stage = StageShutdown::new("resolver", 4);
        stage.retain_started(2).unwrap();
        assert!(stage.retain_started(3).is_err());

        stage.drain(&queue, &Sentinel::default()).unwrap();
        assert_eq!(queue.try_get_count(), 2);
        assert!(stage.retain_started(1).is_err());
    }

    #[test]
    fn test_drain_on_destroyed_queue_fails_loudly() {
        let queue = BoundedQueue::new("hosts", 2, 16).unwrap();
        queue.destroy().unwrap();
        let stage = StageShutdown::new("resolver", 2);
        let err = stage.drain(&queue, &Sentinel::default()).unwrap_err();
        assert!(matches!(err, LookupError::Queue(crate::errors::QueueError::Destroyed)));
        assert_eq!(stage.sentinels_sent(), 0);
    }
}
