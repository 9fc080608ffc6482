//! The two-stage lookup pipeline
//!
//! ```text
//!  data files ──▶ [files queue] ──▶ requesters ──▶ [hosts queue] ──▶ resolvers
//!                                      │                              │
//!                                requester log                  resolver log
//! ```
//!
//! The driver owns both queues and the shutdown state of both stages; the
//! worker routines only see them through their [`WorkerTask`].

pub mod driver;
pub mod routines;
pub mod summary;
pub mod task;

pub use driver::{Pipeline, RunRequest};
pub use summary::{RunSummary, WorkerSummary};
pub use task::{Stage, WorkerReport, WorkerTask};
