//! Command-line interface for multi-lookup
//!
//! Parses the positional thread counts, log paths and data files, loads the
//! layered configuration, and runs the pipeline. All validation happens
//! before the first worker thread is spawned.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

mod output;

pub use output::Output;

use crate::config::PipelineConfig;
use crate::parallel::OutputCoordinator;
use crate::pipeline::{Pipeline, RunRequest, RunSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "multi-lookup",
    version = crate::VERSION,
    about = "Resolve the host names listed in data files using requester and resolver threads",
    long_about = "Requester threads read data files (one host name per line), append each name to \
                  REQUESTER_LOG and hand it to resolver threads, which write \
                  '<name>, <address>' lines to RESOLVER_LOG."
)]
pub struct Cli {
    /// Number of requester threads
    #[arg(value_name = "REQUESTERS")]
    pub requesters: usize,

    /// Number of resolver threads
    #[arg(value_name = "RESOLVERS")]
    pub resolvers: usize,

    /// File receiving every host name read by the requesters
    #[arg(value_name = "REQUESTER_LOG")]
    pub requester_log: PathBuf,

    /// File receiving one '<name>, <address>' line per host name
    #[arg(value_name = "RESOLVER_LOG")]
    pub resolver_log: PathBuf,

    /// Data files, one host name per line
    #[arg(value_name = "DATA_FILE")]
    pub data_files: Vec<String>,

    /// Use custom configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Format of the end-of-run report
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        setup_logging(self.verbose, self.quiet);
        let output = Output::new(self.verbose > 0, self.quiet);

        let config = PipelineConfig::load_with_custom_config(self.config.as_deref())
            .context("failed to load configuration")?;
        tracing::debug!(?config, "configuration loaded");

        let pipeline = Pipeline::new(config)?;
        let request = RunRequest {
            requesters: self.requesters,
            resolvers: self.resolvers,
            files: self.data_files,
        };
        pipeline.validate(&request)?;

        let coordinator = OutputCoordinator::open(&self.requester_log, &self.resolver_log)?;
        let result = pipeline.run(&request, &coordinator);
        // Sinks are flushed even when the run failed
        let flushed = coordinator.destroy();

        let summary = result?;
        flushed.context("failed to flush output")?;

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
            OutputFormat::Text => print_summary(&output, &summary),
        }
        Ok(())
    }
}

fn print_summary(output: &Output, summary: &RunSummary) {
    if output.is_quiet() {
        return;
    }

    output.header("Run summary");
    output.summary_stats("data files serviced", summary.files_serviced);
    output.summary_stats("data files skipped", summary.files_skipped);
    output.summary_stats("host names resolved", summary.hosts_resolved);
    output.summary_stats("host names unresolved", summary.hosts_not_resolved);
    output.summary_stats("item errors", summary.item_errors);
    for worker in &summary.workers {
        output.verbose_key_value(
            &worker.worker,
            &format!("{} serviced in {:.2}s", worker.serviced, worker.elapsed_secs),
        );
    }

    if summary.item_errors > 0 {
        output.warning(&format!(
            "{} item error(s) reported on stderr",
            summary.item_errors
        ));
    } else {
        output.success(&format!("finished in {:.2}s", summary.elapsed.as_secs_f64()));
    }
}

/// Install the tracing subscriber. `RUST_LOG` wins over `-v`.
fn setup_logging(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        match verbose {
            0 => tracing_subscriber::EnvFilter::new("warn"),
            1 => tracing_subscriber::EnvFilter::new("info"),
            2 => tracing_subscriber::EnvFilter::new("debug"),
            _ => tracing_subscriber::EnvFilter::new("trace"),
        }
    });

    // Diagnostics share stderr with item errors, never stdout
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
