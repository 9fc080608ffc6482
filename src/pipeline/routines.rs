//! Worker loops for the two stages.
//!
//! Both loops block on `get`, stop on the first sentinel they take and never
//! forward it. Per-item failures are written to the error sink and the loop
//! moves on; a destroyed queue or sink ends the worker with an error and
//! closes both of its queues, which wakes everyone blocked on them.

use std::io;
use std::thread;
use std::time::Instant;

use super::task::{Stage, WorkerReport, WorkerTask};
use crate::errors::{LookupError, QueueError, Result};
use crate::input::host_from_line;
use crate::parallel::{BoundedQueue, Sink};

/// Requester loop: take data file names, emit their host names.
pub fn requester(mut task: Box<WorkerTask<'_>>) -> WorkerReport {
    let _unwind = CloseOnUnwind::new(&task);
    let started = Instant::now();
    let mut file_name = String::with_capacity(task.consume.max_item_len() + 1);

    let exit = loop {
        if let Err(e) = task.consume.get(&mut file_name) {
            break Err(e.into());
        }
        if task.sentinel.is(&file_name) {
            task.shutdown.worker_stopped();
            break Ok(());
        }

        task.serviced += 1;
        if let Err(err) = service_file(&mut task, &file_name) {
            if let Err(err) = recover(&mut task, err) {
                break Err(err);
            }
        }
    };

    finish(task, started, exit)
}

/// Resolver loop: take host names, write `<host>, <address>` lines.
pub fn resolver(mut task: Box<WorkerTask<'_>>) -> WorkerReport {
    let _unwind = CloseOnUnwind::new(&task);
    let started = Instant::now();
    let mut host = String::with_capacity(task.consume.max_item_len() + 1);

    let exit = loop {
        if let Err(e) = task.consume.get(&mut host) {
            break Err(e.into());
        }
        if task.sentinel.is(&host) {
            task.shutdown.worker_stopped();
            break Ok(());
        }

        task.serviced += 1;
        let address = match task.resolver.resolve(&host) {
            Ok(address) => address,
            Err(e) => {
                tracing::debug!(host = %host, "{e}");
                task.misses += 1;
                task.not_resolved.to_string()
            }
        };

        let line = format!("{host}, {address}");
        if let Err(err) = task.coordinator.write_line(task.output, &line) {
            if let Err(err) = recover(&mut task, err.into()) {
                break Err(err);
            }
        }
    };

    finish(task, started, exit)
}

fn service_file(task: &mut WorkerTask<'_>, file_name: &str) -> Result<()> {
    let source = task.lines;
    let lines = source
        .open(file_name)
        .map_err(|e| LookupError::io(file_name, e))?;

    tracing::debug!(file = file_name, "servicing data file");
    for (index, line) in lines.enumerate() {
        let line = match line {
            Ok(line) => line,
            // The reader already consumed the bad line, so the rest of the
            // file is still usable
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                let item = format!("{file_name}:{}", index + 1);
                recover(task, LookupError::item(item, e.to_string()))?;
                continue;
            }
            Err(e) => return Err(LookupError::io(file_name, e)),
        };
        let Some(host) = host_from_line(&line) else {
            continue;
        };
        if let Err(err) = service_host(task, host) {
            recover(task, err)?;
        }
    }
    Ok(())
}

fn service_host(task: &mut WorkerTask<'_>, host: &str) -> Result<()> {
    if task.sentinel.is(host) {
        return Err(LookupError::item(host, "reserved as the end-of-work marker"));
    }

    if let Some(queue) = task.produce {
        queue.put(host).map_err(|e| match e {
            QueueError::ItemTooLarge { .. } => LookupError::item(host, e.to_string()),
            other => other.into(),
        })?;
        task.produced += 1;
    }

    task.coordinator.write_line(task.output, host)?;
    Ok(())
}

/// Report a recoverable error on the error sink and count it. Structural
/// errors are handed back so the worker can stop.
fn recover(task: &mut WorkerTask<'_>, err: LookupError) -> Result<()> {
    if !err.is_recoverable() {
        return Err(err);
    }

    task.item_errors += 1;
    let message = match &err {
        LookupError::Io { path, source } => {
            format!("Invalid file: {}: {source}", path.display())
        }
        other => other.to_string(),
    };
    tracing::debug!(stage = %task.stage, "{message}");
    if let Err(e) = task.coordinator.write_line(Sink::Stderr, &message) {
        tracing::warn!("could not report item error: {e}");
    }
    Ok(())
}

/// Close both queues of a worker that stops without its sentinel, so blocked
/// peers and the driver fail with `Destroyed` instead of waiting forever.
fn close_queues(consume: &BoundedQueue, produce: Option<&BoundedQueue>) {
    consume.close();
    if let Some(queue) = produce {
        queue.close();
    }
}

/// Closes the worker's queues if its routine panics.
struct CloseOnUnwind<'a> {
    consume: &'a BoundedQueue,
    produce: Option<&'a BoundedQueue>,
}

impl<'a> CloseOnUnwind<'a> {
    fn new(task: &WorkerTask<'a>) -> Self {
        Self {
            consume: task.consume,
            produce: task.produce,
        }
    }
}

impl Drop for CloseOnUnwind<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            close_queues(self.consume, self.produce);
        }
    }
}

fn finish(task: Box<WorkerTask<'_>>, started: Instant, exit: Result<()>) -> WorkerReport {
    if exit.is_err() {
        close_queues(task.consume, task.produce);
    }
    let elapsed = started.elapsed();
    let worker = thread::current().name().unwrap_or("worker").to_string();

    let summary = match task.stage {
        Stage::Requester => format!(
            "thread {worker} serviced {} files in {:.2} seconds",
            task.serviced,
            elapsed.as_secs_f64()
        ),
        Stage::Resolver => format!(
            "thread {worker} resolved {} hosts in {:.2} seconds",
            task.serviced,
            elapsed.as_secs_f64()
        ),
    };
    if let Err(e) = task.coordinator.write_line(Sink::Stdout, &summary) {
        tracing::warn!(worker = %worker, "could not write summary: {e}");
    }

    match &exit {
        Ok(()) => tracing::debug!(worker = %worker, serviced = task.serviced, "worker stopped"),
        Err(e) => tracing::error!(worker = %worker, "worker exited before its sentinel: {e}"),
    }

    WorkerReport {
        worker,
        stage: task.stage,
        serviced: task.serviced,
        produced: task.produced,
        misses: task.misses,
        item_errors: task.item_errors,
        elapsed,
        exit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::MemoryLineSource;
    use crate::parallel::{MemorySink, OutputCoordinator, Sentinel, StageShutdown};
    use crate::resolve::StaticResolver;

    fn coordinator(requester_log: &MemorySink, stderr: &MemorySink) -> OutputCoordinator {
        OutputCoordinator::new(
            requester_log.writer(),
            MemorySink::new().writer(),
            MemorySink::new().writer(),
            stderr.writer(),
        )
    }

    fn drain_items(queue: &BoundedQueue) -> Vec<String> {
        let mut items = Vec::new();
        let mut out = String::new();
        while !queue.is_empty() {
            queue.get(&mut out).unwrap();
            items.push(out.clone());
        }
        items
    }

    #[test]
    fn test_requester_never_forwards_a_sentinel() {
        let (requester_log, stderr) = (MemorySink::new(), MemorySink::new());
        let coordinator = coordinator(&requester_log, &stderr);
        let lines = MemoryLineSource::new()
            .with_file("a.txt", ["alpha.example", "{END}", " {END} ", "beta.example"])
            .with_file("b.txt", ["gamma.example"]);
        let resolver = StaticResolver::new();
        let sentinel = Sentinel::default();
        let files = BoundedQueue::new("files", 4, 64).unwrap();
        let hosts = BoundedQueue::new("hosts", 8, 64).unwrap();
        let shutdown = StageShutdown::new("requester", 1);

        files.put("a.txt").unwrap();
        files.put("b.txt").unwrap();
        shutdown.drain(&files, &sentinel).unwrap();

        let task = WorkerTask::new(
            Stage::Requester,
            &files,
            Some(&hosts),
            &coordinator,
            &shutdown,
            &sentinel,
            &lines,
            &resolver,
            "NOT_RESOLVED",
        );
        let report = requester(Box::new(task));

        assert!(report.exit.is_ok());
        assert_eq!(report.serviced, 2);
        assert_eq!(report.produced, 3);
        assert_eq!(report.item_errors, 2);

        let forwarded = drain_items(&hosts);
        assert!(forwarded.iter().all(|host| !sentinel.is(host)));
        assert_eq!(forwarded, vec!["alpha.example", "beta.example", "gamma.example"]);
        assert_eq!(stderr.lines().len(), 2);
        assert!(files.is_empty());
    }

    #[test]
    fn test_structural_exit_closes_both_queues() {
        let (requester_log, stderr) = (MemorySink::new(), MemorySink::new());
        let coordinator = coordinator(&requester_log, &stderr);
        coordinator.destroy().unwrap();
        let lines = MemoryLineSource::new().with_file("a.txt", ["alpha.example"]);
        let resolver = StaticResolver::new();
        let sentinel = Sentinel::default();
        let files = BoundedQueue::new("files", 2, 64).unwrap();
        let hosts = BoundedQueue::new("hosts", 2, 64).unwrap();
        let shutdown = StageShutdown::new("requester", 1);
        files.put("a.txt").unwrap();

        let task = WorkerTask::new(
            Stage::Requester,
            &files,
            Some(&hosts),
            &coordinator,
            &shutdown,
            &sentinel,
            &lines,
            &resolver,
            "NOT_RESOLVED",
        );
        let report = requester(Box::new(task));

        assert!(matches!(report.exit, Err(LookupError::Sink(_))));
        assert!(files.is_closed());
        assert!(hosts.is_closed());
        assert_eq!(files.put("b.txt"), Err(QueueError::Destroyed));
        // Closing does not release the slots; the owner still destroys once
        assert!(files.destroy().is_ok());
        assert!(hosts.destroy().is_ok());
    }

    #[test]
    fn test_resolver_stops_when_its_queue_is_closed() {
        let (requester_log, stderr) = (MemorySink::new(), MemorySink::new());
        let coordinator = coordinator(&requester_log, &stderr);
        let lines = MemoryLineSource::new();
        let names = StaticResolver::new();
        let sentinel = Sentinel::default();
        let hosts = BoundedQueue::new("hosts", 2, 64).unwrap();
        let shutdown = StageShutdown::new("resolver", 1);

        let report = crossbeam::thread::scope(|s| {
            let task = WorkerTask::new(
                Stage::Resolver,
                &hosts,
                None,
                &coordinator,
                &shutdown,
                &sentinel,
                &lines,
                &names,
                "NOT_RESOLVED",
            );
            let worker = s.spawn(move |_| resolver(Box::new(task)));
            hosts.close();
            worker.join().unwrap()
        })
        .unwrap();

        assert!(matches!(report.exit, Err(LookupError::Queue(QueueError::Destroyed))));
        assert_eq!(report.serviced, 0);
    }
}
