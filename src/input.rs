//! Line-oriented input for requester workers.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};

pub type Lines<'a> = Box<dyn Iterator<Item = io::Result<String>> + 'a>;

/// Opens a data file and yields its lines without line terminators.
pub trait LineSource: Send + Sync {
    fn open(&self, path: &str) -> io::Result<Lines<'_>>;
}

/// Reads data files from the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLineSource;

impl LineSource for FileLineSource {
    fn open(&self, path: &str) -> io::Result<Lines<'_>> {
        let file = File::open(path)?;
        // `lines` strips both "\n" and "\r\n"
        Ok(Box::new(BufReader::new(file).lines()))
    }
}

/// In-memory data files keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MemoryLineSource {
    files: HashMap<String, Vec<String>>,
}

impl MemoryLineSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file<I, S>(mut self, name: impl Into<String>, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files
            .insert(name.into(), lines.into_iter().map(Into::into).collect());
        self
    }
}

impl LineSource for MemoryLineSource {
    fn open(&self, path: &str) -> io::Result<Lines<'_>> {
        let lines = self.files.get(path).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no such data file: {path}"))
        })?;
        Ok(Box::new(lines.iter().cloned().map(Ok)))
    }
}

/// Trim surrounding whitespace; blank lines carry no host name.
pub fn host_from_line(line: &str) -> Option<&str> {
    let host = line.trim();
    (!host.is_empty()).then_some(host)
}
