use std::time::Instant;

use super::routines;
use super::summary::RunSummary;
use super::task::{Stage, WorkerReport, WorkerTask};
use crate::config::PipelineConfig;
use crate::errors::{LookupError, QueueError, Result};
use crate::input::{FileLineSource, LineSource};
use crate::parallel::{BoundedQueue, OutputCoordinator, Sentinel, Sink, StageShutdown, WorkerPool};
use crate::resolve::{Resolve, SystemResolver};

/// What to run: thread counts per stage and the data files to service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRequest {
    pub requesters: usize,
    pub resolvers: usize,
    pub files: Vec<String>,
}

/// Owns the configuration and collaborators of a run and drives the two
/// stages from spawn to join.
pub struct Pipeline {
    config: PipelineConfig,
    sentinel: Sentinel,
    lines: Box<dyn LineSource>,
    resolver: Box<dyn Resolve>,
}

impl Pipeline {
    /// Pipeline reading data files from disk and resolving through the OS.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let sentinel = Sentinel::new(config.sentinel.clone())?;
        let resolver = SystemResolver::new(config.prefer_ipv4);
        Ok(Self {
            config,
            sentinel,
            lines: Box::new(FileLineSource),
            resolver: Box::new(resolver),
        })
    }

    pub fn with_line_source(mut self, lines: impl LineSource + 'static) -> Self {
        self.lines = Box::new(lines);
        self
    }

    pub fn with_resolver(mut self, resolver: impl Resolve + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    /// Check thread counts and the number of data files against the
    /// configured maximums.
    pub fn validate(&self, request: &RunRequest) -> Result<()> {
        let limits = [
            ("requesters", request.requesters, self.config.max_requester_threads),
            ("resolvers", request.resolvers, self.config.max_resolver_threads),
        ];
        for (parameter, count, max) in limits {
            if count > max {
                return Err(LookupError::config(
                    parameter,
                    format!("{count} threads requested, at most {max} allowed"),
                ));
            }
        }

        if request.files.len() > self.config.max_input_files {
            return Err(LookupError::config(
                "data files",
                format!(
                    "{} files given, at most {} allowed",
                    request.files.len(),
                    self.config.max_input_files
                ),
            ));
        }
        Ok(())
    }

    /// Run both stages to completion.
    ///
    /// Resolvers are spawned first, then requesters; the data files are fed,
    /// stage 1 is drained and joined, and only then stage 2 is drained and
    /// joined. Every started thread is joined before this returns, even when
    /// spawning failed part way or a worker stopped on a structural error
    /// (that worker closes both queues, which unblocks the rest). The first
    /// worker or spawn failure is returned after all joins; item errors only
    /// show up in the summary.
    ///
    /// The caller owns `coordinator` and destroys it afterwards.
    pub fn run(&self, request: &RunRequest, coordinator: &OutputCoordinator) -> Result<RunSummary> {
        self.validate(request)?;
        let started = Instant::now();

        let files = BoundedQueue::new("files", self.config.queue_capacity, self.config.max_file_name_length)?;
        let hosts = BoundedQueue::new("hosts", self.config.queue_capacity, self.config.max_name_length)?;
        let requesters = StageShutdown::new(Stage::Requester.name(), request.requesters);
        let resolvers = StageShutdown::new(Stage::Resolver.name(), request.resolvers);
        let mut summary = RunSummary::default();

        let scoped = crossbeam::thread::scope(|scope| {
            let mut first_error: Option<LookupError> = None;

            let resolver_task = WorkerTask::new(
                Stage::Resolver,
                &hosts,
                None,
                coordinator,
                &resolvers,
                &self.sentinel,
                self.lines.as_ref(),
                self.resolver.as_ref(),
                &self.config.not_resolved,
            );
            let mut resolver_pool = WorkerPool::spawn(
                scope,
                Stage::Resolver.name(),
                &resolver_task,
                request.resolvers,
                routines::resolver,
            );
            keep_first(&mut first_error, resolver_pool.take_spawn_error());
            keep_first(&mut first_error, resolvers.retain_started(resolver_pool.len()).err());

            // No requesters after a failed spawn; the started resolvers are
            // still drained below.
            let requester_count = if first_error.is_some() { 0 } else { request.requesters };
            let produce = (!resolver_pool.is_empty()).then_some(&hosts);
            let requester_task = WorkerTask::new(
                Stage::Requester,
                &files,
                produce,
                coordinator,
                &requesters,
                &self.sentinel,
                self.lines.as_ref(),
                self.resolver.as_ref(),
                &self.config.not_resolved,
            );
            let mut requester_pool = WorkerPool::spawn(
                scope,
                Stage::Requester.name(),
                &requester_task,
                requester_count,
                routines::requester,
            );
            keep_first(&mut first_error, requester_pool.take_spawn_error());
            keep_first(&mut first_error, requesters.retain_started(requester_pool.len()).err());

            if first_error.is_none() && !requester_pool.is_empty() {
                let fed = self.feed(&files, &request.files, coordinator, &mut summary);
                keep_first(&mut first_error, fed.err());
            } else {
                if first_error.is_none() && !request.files.is_empty() {
                    tracing::warn!(files = request.files.len(), "no requester threads; data files skipped");
                }
                summary.files_skipped += request.files.len();
            }

            keep_first(&mut first_error, requesters.drain(&files, &self.sentinel).err());
            collect(&mut summary, &mut first_error, requester_pool.join());
            requesters.finish();

            keep_first(
                &mut first_error,
                resolvers.drain_after(&requesters, &hosts, &self.sentinel).err(),
            );
            collect(&mut summary, &mut first_error, resolver_pool.join());
            resolvers.finish();

            first_error
        })
        .map_err(|_| LookupError::Resource("a worker thread panicked outside its routine".into()));

        let teardown: std::result::Result<(), QueueError> =
            [files.destroy(), hosts.destroy()].into_iter().collect();

        if let Some(err) = scoped? {
            return Err(err);
        }
        teardown?;

        summary.elapsed = started.elapsed();
        tracing::info!(
            files = summary.files_serviced,
            hosts = summary.hosts_resolved + summary.hosts_not_resolved,
            item_errors = summary.item_errors,
            "run complete"
        );
        Ok(summary)
    }

    /// Enqueue every data file name. Names that do not fit a slot are
    /// reported and skipped.
    fn feed(
        &self,
        queue: &BoundedQueue,
        files: &[String],
        coordinator: &OutputCoordinator,
        summary: &mut RunSummary,
    ) -> Result<()> {
        for file in files {
            match queue.put(file) {
                Ok(()) => summary.files_enqueued += 1,
                Err(e @ QueueError::ItemTooLarge { .. }) => {
                    let err = LookupError::item(file.as_str(), e.to_string());
                    tracing::warn!("{err}");
                    coordinator.write_line(Sink::Stderr, &format!("Invalid file: {err}"))?;
                    summary.files_skipped += 1;
                    summary.item_errors += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
        tracing::debug!(enqueued = summary.files_enqueued, skipped = summary.files_skipped, "data files fed");
        Ok(())
    }
}

/// Keep the first failure of the run. A closed queue is usually the
/// consequence of another worker's failure, so a more specific error that
/// shows up later (for instance at join) takes its place.
fn keep_first(first: &mut Option<LookupError>, err: Option<LookupError>) {
    let Some(err) = err else {
        return;
    };
    match first {
        None => *first = Some(err),
        Some(LookupError::Queue(QueueError::Destroyed))
            if !matches!(err, LookupError::Queue(QueueError::Destroyed)) =>
        {
            tracing::debug!("queue closed after: {err}");
            *first = Some(err);
        }
        Some(_) => tracing::debug!("additional failure: {err}"),
    }
}

fn collect(summary: &mut RunSummary, first: &mut Option<LookupError>, joined: Vec<Result<WorkerReport>>) {
    for result in joined {
        match result {
            Ok(report) => {
                summary.record(&report);
                keep_first(first, report.exit.err());
            }
            Err(err) => keep_first(first, Some(err)),
        }
    }
}
