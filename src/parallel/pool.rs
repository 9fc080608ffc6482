use crossbeam::thread::{Scope, ScopedJoinHandle};
use std::sync::Arc;

use crate::errors::{LookupError, Result};

/// A fixed set of named worker threads running the same routine inside a
/// `crossbeam` scope.
///
/// Every thread gets its own boxed copy of the shared context, so no two
/// workers ever share a mutable context. The box is owned by the thread for
/// its whole life and dropped when the routine returns; `join` consumes the
/// pool, so each handle is joined exactly once.
pub struct WorkerPool<'scope, T> {
    stage: &'static str,
    handles: Vec<(String, ScopedJoinHandle<'scope, T>)>,
    spawn_error: Option<LookupError>,
}

impl<'scope, T> WorkerPool<'scope, T> {
    /// Spawn `count` threads running `routine`.
    ///
    /// If the OS refuses a thread, spawning stops there: threads already
    /// started keep running, the failure is kept in
    /// [`take_spawn_error`](Self::take_spawn_error), and the caller must still
    /// shut down and [`join`](Self::join) the workers that did start.
    pub fn spawn<'env, C, F>(
        scope: &'scope Scope<'env>,
        stage: &'static str,
        shared: &C,
        count: usize,
        routine: F,
    ) -> Self
    where
        C: Clone + Send + 'env,
        F: Fn(Box<C>) -> T + Send + Sync + 'env,
        T: Send + 'env,
    {
        let routine = Arc::new(routine);
        let mut handles = Vec::with_capacity(count);
        let mut spawn_error = None;

        for worker_id in 0..count {
            let name = format!("{stage}-{worker_id}");
            let context = Box::new(shared.clone());
            let routine = routine.clone();

            match scope
                .builder()
                .name(name.clone())
                .spawn(move |_| routine(context))
            {
                Ok(handle) => handles.push((name, handle)),
                Err(e) => {
                    tracing::error!(stage, worker = %name, "failed to spawn worker: {e}");
                    spawn_error = Some(LookupError::Resource(format!(
                        "failed to create {stage} thread {worker_id} of {count}: {e}"
                    )));
                    break;
                }
            }
        }

        tracing::debug!(stage, started = handles.len(), requested = count, "worker pool spawned");

        Self {
            stage,
            handles,
            spawn_error,
        }
    }

    /// Number of threads actually running.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn take_spawn_error(&mut self) -> Option<LookupError> {
        self.spawn_error.take()
    }

    /// Wait for every worker in spawn order. A worker that panicked yields a
    /// resource error in its position.
    pub fn join(self) -> Vec<Result<T>> {
        let stage = self.stage;
        self.handles
            .into_iter()
            .map(|(name, handle)| {
                handle.join().map_err(|_| {
                    tracing::error!(stage, worker = %name, "worker panicked");
                    LookupError::Resource(format!("{stage} worker {name} panicked"))
                })
            })
            .collect()
    }
}
