//! Concurrency building blocks for the lookup pipeline
//!
//! This module owns everything that is shared between threads and knows
//! nothing about host names or files:
//!
//! - [`BoundedQueue`]: fixed-capacity circular FIFO of text items, blocking
//!   on full/empty, safe for any number of producers and consumers
//! - [`WorkerPool`]: a fixed set of scoped worker threads, each owning a
//!   private copy of its context
//! - [`StageShutdown`] and [`Sentinel`]: the poison-value protocol that stops
//!   a stage once its queue is drained
//! - [`OutputCoordinator`]: one lock per shared output sink
//!
//! # Lifetimes
//!
//! ```text
//! ┌──────────────┐  construct   ┌────────────────────────────┐  destroy
//! │ driver       │ ───────────▶ │ queues + coordinator       │ ◀────────┐
//! │              │              └────────────┬───────────────┘          │
//! │              │  spawn (scope)            │ &borrow                  │
//! │              │ ───────────▶ workers ─────┘                          │
//! │              │  join all   ◀──────────                              │
//! └──────────────┘ ─────────────────────────────────────────────────────┘
//! ```
//!
//! Queues and the coordinator are built before the first spawn and destroyed
//! only after the last join; workers borrow them for the duration of a
//! `crossbeam` scope, so no worker can outlive them.

pub mod coordinator;
pub mod pool;
pub mod queue;
mod semaphore;
pub mod shutdown;

pub use coordinator::{MemorySink, OutputCoordinator, Sink, SinkWriter};
pub use pool::WorkerPool;
pub use queue::BoundedQueue;
pub use shutdown::{Sentinel, StageShutdown, StageState};
