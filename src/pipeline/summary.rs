use serde::Serialize;
use std::time::Duration;

use super::task::{Stage, WorkerReport};

/// Per-worker line of a [`RunSummary`].
#[derive(Debug, Clone, Serialize)]
pub struct WorkerSummary {
    pub worker: String,
    pub stage: Stage,
    pub serviced: usize,
    pub produced: usize,
    pub misses: usize,
    pub item_errors: usize,
    pub elapsed_secs: f64,
    /// Set when the worker stopped on an error instead of a sentinel
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&WorkerReport> for WorkerSummary {
    fn from(report: &WorkerReport) -> Self {
        Self {
            worker: report.worker.clone(),
            stage: report.stage,
            serviced: report.serviced,
            produced: report.produced,
            misses: report.misses,
            item_errors: report.item_errors,
            elapsed_secs: report.elapsed.as_secs_f64(),
            error: report.exit.as_ref().err().map(ToString::to_string),
        }
    }
}

/// Totals for one pipeline run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub files_enqueued: usize,
    pub files_skipped: usize,
    pub files_serviced: usize,
    pub hosts_enqueued: usize,
    pub hosts_resolved: usize,
    pub hosts_not_resolved: usize,
    pub item_errors: usize,
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs")]
    pub elapsed: Duration,
    pub workers: Vec<WorkerSummary>,
}

impl RunSummary {
    /// Fold one worker's counters into the totals.
    pub fn record(&mut self, report: &WorkerReport) {
        match report.stage {
            Stage::Requester => {
                self.files_serviced += report.serviced;
                self.hosts_enqueued += report.produced;
            }
            Stage::Resolver => {
                self.hosts_resolved += report.serviced - report.misses;
                self.hosts_not_resolved += report.misses;
            }
        }
        self.item_errors += report.item_errors;
        self.workers.push(report.into());
    }

    pub fn worker_count(&self, stage: Stage) -> usize {
        self.workers.iter().filter(|w| w.stage == stage).count()
    }
}

fn as_secs<S: serde::Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}
