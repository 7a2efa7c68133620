//! Run reporting.
//!
//! The pipelines emit [`Event`]s to an injected [`ReportSink`] instead of
//! printing or writing files themselves.
use crate::model::UnfixedItem;
use chrono::Local;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairMode {
    Url,
    CrossReference,
}

impl RepairMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairMode::Url => "url",
            RepairMode::CrossReference => "cross_reference",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<'a> {
    RunStarted {
        mode: RepairMode,
        items: usize,
        chunk_size: i64,
        chunks: usize,
    },
    ChunkStarted {
        index: usize,
        total: usize,
    },
    ItemStarted {
        index: usize,
        total: usize,
    },
    ItemRepaired {
        item_id: &'a str,
        author_key: &'a str,
        old_url: &'a str,
        new_url: &'a str,
    },
    ItemSkipped {
        item_id: &'a str,
        reason: &'a str,
    },
    ItemFailed(&'a UnfixedItem),
    ChunkFinished {
        index: usize,
    },
    RunFinished(&'a RepairSummary),
}

pub trait ReportSink: Send + Sync {
    fn report(&self, event: &Event<'_>);
}

/// Outcome counts and failures of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairSummary {
    pub mode: RepairMode,
    pub total: usize,
    pub repaired: usize,
    pub already_canonical: usize,
    pub failures: Vec<UnfixedItem>,
}

impl RepairSummary {
    pub fn new(mode: RepairMode, total: usize) -> Self {
        Self {
            mode,
            total,
            repaired: 0,
            already_canonical: 0,
            failures: Vec::new(),
        }
    }

    pub fn failure_descriptions(&self) -> Vec<String> {
        self.failures.iter().map(ToString::to_string).collect()
    }

    /// Pretty JSON list of failure descriptions.
    pub fn failures_json(&self) -> String {
        pretty_json(&self.failure_descriptions())
    }
}

pub fn pretty_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|err| {
        warn!(?err, "failed to render JSON");
        String::new()
    })
}

/// Human-readable progress on stdout.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ReportSink for ConsoleSink {
    fn report(&self, event: &Event<'_>) {
        match event {
            Event::RunStarted {
                mode,
                items,
                chunk_size,
                chunks,
            } => {
                println!("Running {} repair on {} items", mode.as_str(), items);
                println!("Chunk size {}, {} chunks", chunk_size, chunks);
            }
            Event::ChunkStarted { index, total } => println!("[{}/{}] Running chunk...", index, total),
            Event::ItemStarted { index, total } => println!("\t[{}/{}] Repairing...", index, total),
            Event::ItemRepaired {
                item_id,
                author_key,
                old_url,
                new_url,
            } => {
                println!("\t  Author key: {}", author_key);
                println!("\t  URL: {} -> {}", old_url, new_url);
                println!("\t  Repaired {}", item_id);
            }
            Event::ItemSkipped { item_id, reason } => println!("\t  Skipped {}: {}", item_id, reason),
            Event::ItemFailed(item) => println!("\t  FAILED: {}", item),
            Event::ChunkFinished { .. } => println!("-----"),
            Event::RunFinished(summary) => {
                println!(
                    "Done: {} repaired, {} already canonical, {} failed of {}",
                    summary.repaired,
                    summary.already_canonical,
                    summary.failures.len(),
                    summary.total
                );
                println!("UNFIXED: {}", summary.failures_json());
            }
        }
    }
}

/// Appends a timestamped line per failed item to a log file.
#[derive(Debug)]
pub struct ErrorLogSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ErrorLogSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}: {}", Local::now().format("%Y-%m-%d %H:%M:%S"), line)
    }
}

impl ReportSink for ErrorLogSink {
    fn report(&self, event: &Event<'_>) {
        if let Event::ItemFailed(item) = event {
            if let Err(err) = self.append(&item.to_string()) {
                warn!(?err, path = %self.path.display(), "failed to write error log");
            }
        }
    }
}

/// Fans every event out to several sinks.
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn ReportSink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl ReportSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl ReportSink for MultiSink {
    fn report(&self, event: &Event<'_>) {
        for sink in &self.sinks {
            sink.report(event);
        }
    }
}
