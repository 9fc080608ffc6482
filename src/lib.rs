//! # multi-lookup - Threaded host name resolution
//!
//! Reads data files containing one host name per line and resolves every name
//! with two fixed pools of threads connected by bounded queues:
//!
//! - **Requesters** take data file names from the first queue, log every host
//!   name they read and push it into the second queue.
//! - **Resolvers** take host names from the second queue and log
//!   `<name>, <address>` (or the not-resolved marker).
//!
//! Each stage is stopped by pushing one end-of-work sentinel per worker after
//! its last real item, and the resolver stage is only drained once every
//! requester has been joined.
//!
//! ## Quick Start
//!
//! ```bash
//! # 3 requesters, 5 resolvers
//! multi-lookup 3 5 serviced.txt results.txt input/names*.txt
//! ```

pub mod cli;
pub mod config;
pub mod errors;
pub mod input;
pub mod parallel;
pub mod pipeline;
pub mod resolve;

pub use cli::{Cli, Output};
pub use config::PipelineConfig;
pub use errors::{LookupError, Result};
pub use pipeline::{Pipeline, RunRequest, RunSummary};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
