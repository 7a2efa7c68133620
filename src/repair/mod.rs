//! Batch repair pipelines.
//!
//! Both pipelines fetch their work items once, walk them chunk by chunk and
//! item by item, and record every failed item instead of stopping. A run
//! succeeds only when no item failed.

pub mod cross_ref;
pub mod url;

use crate::model::UnfixedItem;
use crate::report::{Event, RepairMode, RepairSummary, ReportSink};
use thiserror::Error;
use tracing::{info, warn};

pub use cross_ref::repair_cross_references;
pub use url::repair_urls;

#[derive(Debug, Error)]
pub enum RepairError {
    #[error("failed to fetch work items: {0:#}")]
    Fetch(anyhow::Error),
    #[error(
        "{} items were not repaired\nUNFIXED: {}",
        .summary.failures.len(),
        .summary.failures_json()
    )]
    Incomplete { summary: RepairSummary },
}

impl RepairError {
    /// Summary of a completed run, if the run got that far.
    pub fn summary(&self) -> Option<&RepairSummary> {
        match self {
            RepairError::Fetch(_) => None,
            RepairError::Incomplete { summary } => Some(summary),
        }
    }
}

/// A successfully repaired item, as reported to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Repaired {
    pub item_id: String,
    pub author_key: String,
    pub old_url: String,
    pub new_url: String,
}

/// Per-item outcome that is not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    Repaired(Repaired),
    Skipped { item_id: String, reason: &'static str },
}

/// Accumulates outcomes for one run and forwards them to the sink.
pub(crate) struct RunTracker<'a> {
    sink: &'a dyn ReportSink,
    summary: RepairSummary,
}

impl<'a> RunTracker<'a> {
    pub fn start(
        sink: &'a dyn ReportSink,
        mode: RepairMode,
        items: usize,
        chunk_size: i64,
        chunks: usize,
    ) -> Self {
        info!(mode = mode.as_str(), items, chunk_size, chunks, "starting repair run");
        sink.report(&Event::RunStarted {
            mode,
            items,
            chunk_size,
            chunks,
        });
        Self {
            sink,
            summary: RepairSummary::new(mode, items),
        }
    }

    pub fn chunk_started(&self, index: usize, total: usize) {
        self.sink.report(&Event::ChunkStarted { index, total });
    }

    pub fn chunk_finished(&self, index: usize) {
        self.sink.report(&Event::ChunkFinished { index });
    }

    pub fn item_started(&self, index: usize, total: usize) {
        self.sink.report(&Event::ItemStarted { index, total });
    }

    pub fn record(&mut self, result: Result<Outcome, UnfixedItem>) {
        match result {
            Ok(Outcome::Repaired(r)) => {
                info!(item_id = %r.item_id, old_url = %r.old_url, new_url = %r.new_url, "item repaired");
                self.sink.report(&Event::ItemRepaired {
                    item_id: &r.item_id,
                    author_key: &r.author_key,
                    old_url: &r.old_url,
                    new_url: &r.new_url,
                });
                self.summary.repaired += 1;
            }
            Ok(Outcome::Skipped { item_id, reason }) => {
                info!(%item_id, reason, "item skipped");
                self.sink.report(&Event::ItemSkipped {
                    item_id: &item_id,
                    reason,
                });
                self.summary.already_canonical += 1;
            }
            Err(item) => {
                warn!(item_id = %item.item_id, reason = %item.reason, error = %item.error, "item not repaired");
                self.sink.report(&Event::ItemFailed(&item));
                self.summary.failures.push(item);
            }
        }
    }

    pub fn finish(self) -> Result<RepairSummary, RepairError> {
        self.sink.report(&Event::RunFinished(&self.summary));
        info!(
            repaired = self.summary.repaired,
            already_canonical = self.summary.already_canonical,
            failed = self.summary.failures.len(),
            "repair run finished"
        );
        if self.summary.failures.is_empty() {
            Ok(self.summary)
        } else {
            Err(RepairError::Incomplete {
                summary: self.summary,
            })
        }
    }
}
