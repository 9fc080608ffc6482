//! Error types for multi-lookup operations.
//!
//! The taxonomy mirrors how each failure is handled by the pipeline:
//! configuration and resource errors stop the run, item and I/O errors are
//! reported to the error sink and the worker moves on, and structural errors
//! (using a queue or sink after it was destroyed) always surface loudly.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for multi-lookup operations
pub type Result<T> = std::result::Result<T, LookupError>;

/// Errors raised by a [`BoundedQueue`](crate::parallel::BoundedQueue).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The item does not fit a slot (one byte of every slot is reserved).
    #[error("item of {len} bytes exceeds slot capacity ({max} bytes usable)")]
    ItemTooLarge { len: usize, max: usize },

    /// The queue was closed or destroyed while (or before) the caller used it.
    #[error("queue has been destroyed")]
    Destroyed,

    /// `destroy` was called a second time.
    #[error("queue was already destroyed")]
    AlreadyDestroyed,
}

/// Errors raised by the [`OutputCoordinator`](crate::parallel::OutputCoordinator).
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("output sink '{0}' has been destroyed")]
    Destroyed(&'static str),

    #[error("output sinks were already destroyed")]
    AlreadyDestroyed,

    #[error("write to output sink '{sink}' failed: {source}")]
    Write {
        sink: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Errors returned by a [`Resolve`](crate::resolve::Resolve) implementation.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("lookup of '{host}' failed: {source}")]
    Lookup {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no address found for '{0}'")]
    NoAddress(String),
}

/// Top level error type
#[derive(Error, Debug)]
pub enum LookupError {
    /// Bad arguments or configuration, reported before anything is allocated
    #[error("Invalid configuration '{parameter}': {reason}")]
    Config { parameter: String, reason: String },

    /// Allocation, thread creation or join failure
    #[error("Resource error: {0}")]
    Resource(String),

    /// A single work item could not be processed
    #[error("Invalid item '{item}': {reason}")]
    Item { item: String, reason: String },

    /// File system error tied to a path
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl LookupError {
    pub fn config(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        LookupError::Config {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    pub fn item(item: impl Into<String>, reason: impl Into<String>) -> Self {
        LookupError::Item {
            item: item.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LookupError::Io {
            path: path.into(),
            source,
        }
    }

    /// Item and I/O errors are recovered by the worker that hit them; queue
    /// and sink misuse, resource and configuration errors are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LookupError::Item { .. }
                | LookupError::Io { .. }
                | LookupError::Queue(QueueError::ItemTooLarge { .. })
                | LookupError::Sink(SinkError::Write { .. })
        )
    }
}
