use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::errors::LookupError;
use crate::input::LineSource;
use crate::parallel::{BoundedQueue, OutputCoordinator, Sentinel, Sink, StageShutdown};
use crate::resolve::Resolve;

/// The two tiers of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Reads data files and emits one host name per line
    Requester,
    /// Resolves host names and records the results
    Resolver,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Requester => "requester",
            Stage::Resolver => "resolver",
        }
    }

    /// Log file the stage writes its results to.
    pub fn log_sink(self) -> Sink {
        match self {
            Stage::Requester => Sink::RequesterLog,
            Stage::Resolver => Sink::ResolverLog,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-thread context. The pool hands every worker its own boxed copy; the
/// borrowed parts are shared, the counters are private to the worker.
#[derive(Clone)]
pub struct WorkerTask<'a> {
    pub stage: Stage,
    pub consume: &'a BoundedQueue,
    /// Downstream queue; `None` for resolvers and for requesters running
    /// without a resolver stage.
    pub produce: Option<&'a BoundedQueue>,
    pub output: Sink,
    pub coordinator: &'a OutputCoordinator,
    pub shutdown: &'a StageShutdown,
    pub sentinel: &'a Sentinel,
    pub lines: &'a dyn LineSource,
    pub resolver: &'a dyn Resolve,
    pub not_resolved: &'a str,

    pub serviced: usize,
    pub produced: usize,
    pub misses: usize,
    pub item_errors: usize,
}

impl<'a> WorkerTask<'a> {
    /// Context for `stage` with zeroed counters, writing to the stage's log.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stage: Stage,
        consume: &'a BoundedQueue,
        produce: Option<&'a BoundedQueue>,
        coordinator: &'a OutputCoordinator,
        shutdown: &'a StageShutdown,
        sentinel: &'a Sentinel,
        lines: &'a dyn LineSource,
        resolver: &'a dyn Resolve,
        not_resolved: &'a str,
    ) -> Self {
        Self {
            stage,
            consume,
            produce,
            output: stage.log_sink(),
            coordinator,
            shutdown,
            sentinel,
            lines,
            resolver,
            not_resolved,
            serviced: 0,
            produced: 0,
            misses: 0,
            item_errors: 0,
        }
    }
}

/// What a worker hands back to the joiner when it exits.
#[derive(Debug)]
pub struct WorkerReport {
    pub worker: String,
    pub stage: Stage,
    /// Files (requesters) or host names (resolvers) taken off the queue
    pub serviced: usize,
    /// Host names pushed downstream (requesters only)
    pub produced: usize,
    /// Host names written with the not-resolved marker (resolvers only)
    pub misses: usize,
    pub item_errors: usize,
    pub elapsed: Duration,
    /// `Err` when the worker stopped on a structural error instead of a
    /// sentinel
    pub exit: Result<(), LookupError>,
}
