use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::errors::{LookupError, SinkError};

/// Shared destinations that workers write to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sink {
    /// One host name per line, written by requesters
    RequesterLog,
    /// `<host>, <result>` lines, written by resolvers
    ResolverLog,
    Stdout,
    Stderr,
}

impl Sink {
    pub const ALL: [Sink; 4] = [
        Sink::RequesterLog,
        Sink::ResolverLog,
        Sink::Stdout,
        Sink::Stderr,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Sink::RequesterLog => "requester-log",
            Sink::ResolverLog => "resolver-log",
            Sink::Stdout => "stdout",
            Sink::Stderr => "stderr",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

pub type SinkWriter = Box<dyn Write + Send>;

/// One lock per named output sink.
///
/// Writers are only reachable through [`OutputCoordinator::with_lock`], so a
/// write is always serialized against every other write to the same sink.
/// The lock is released when the closure returns, errors or unwinds.
pub struct OutputCoordinator {
    sinks: [Mutex<Option<SinkWriter>>; 4],
    destroyed: AtomicBool,
}

impl OutputCoordinator {
    pub fn new(
        requester_log: SinkWriter,
        resolver_log: SinkWriter,
        stdout: SinkWriter,
        stderr: SinkWriter,
    ) -> Self {
        Self {
            sinks: [
                Mutex::new(Some(requester_log)),
                Mutex::new(Some(resolver_log)),
                Mutex::new(Some(stdout)),
                Mutex::new(Some(stderr)),
            ],
            destroyed: AtomicBool::new(false),
        }
    }

    /// Create (truncating) both log files and attach the process streams.
    pub fn open(requester_log: &Path, resolver_log: &Path) -> Result<Self, LookupError> {
        let requester = File::create(requester_log)
            .map_err(|e| LookupError::io(requester_log, e))?;
        let resolver = File::create(resolver_log)
            .map_err(|e| LookupError::io(resolver_log, e))?;

        Ok(Self::new(
            Box::new(BufWriter::new(requester)),
            Box::new(BufWriter::new(resolver)),
            Box::new(io::stdout()),
            Box::new(io::stderr()),
        ))
    }

    /// Run `f` with exclusive access to `sink`.
    pub fn with_lock<R>(
        &self,
        sink: Sink,
        f: impl FnOnce(&mut dyn Write) -> io::Result<R>,
    ) -> Result<R, SinkError> {
        let mut guard = self.sinks[sink.index()].lock();
        let writer = guard.as_mut().ok_or(SinkError::Destroyed(sink.name()))?;
        f(&mut **writer).map_err(|source| SinkError::Write {
            sink: sink.name(),
            source,
        })
    }

    /// Write `line` followed by a newline as one serialized write.
    pub fn write_line(&self, sink: Sink, line: &str) -> Result<(), SinkError> {
        self.with_lock(sink, |w| writeln!(w, "{line}"))
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Flush and release every sink. Only call once all workers have joined.
    ///
    /// Every sink is released even if an earlier flush fails; the first flush
    /// error is returned. A second call returns [`SinkError::AlreadyDestroyed`].
    pub fn destroy(&self) -> Result<(), SinkError> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Err(SinkError::AlreadyDestroyed);
        }

        let mut first_error = None;
        for sink in Sink::ALL {
            let writer = self.sinks[sink.index()].lock().take();
            if let Some(mut writer) = writer {
                if let Err(source) = writer.flush() {
                    first_error.get_or_insert(SinkError::Write {
                        sink: sink.name(),
                        source,
                    });
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// In-memory sink whose contents can be read back while it is still attached
/// to a coordinator.
#[derive(Debug, Clone, Default)]
pub struct MemorySink(Arc<Mutex<Vec<u8>>>);

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }

    pub fn writer(&self) -> SinkWriter {
        Box::new(self.clone())
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
