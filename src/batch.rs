// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Sequential run over a scanned folder

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use crate::pipeline::{SortOutcome, Sorter};

/// Per-file report emitted after each image
#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    /// 1-based position in the run
    pub index: usize,
    pub total: usize,
    pub path: PathBuf,
    pub outcome: SortOutcome,
}

impl Progress {
    /// Status line in the form `[3/10] dog.jpg: Classified and moved to 'dog'`
    pub fn status_line(&self) -> String {
        format!("[{}/{}] {}: {}", self.index, self.total, file_label(&self.path), self.outcome)
    }
}

/// Counts for a finished (or cancelled) run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub sorted: usize,
    pub uncategorized: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn processed(&self) -> usize {
        self.sorted + self.uncategorized + self.failed
    }

    fn record(&mut self, outcome: &SortOutcome) {
        match outcome {
            SortOutcome::Sorted { .. } => self.sorted += 1,
            SortOutcome::Uncategorized { .. } => self.uncategorized += 1,
            _ => self.failed += 1,
        }
    }
}

/// Events emitted while a run progresses
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    Progress(Progress),
    Finished(RunSummary),
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Sort `files` one at a time, reporting each outcome through `on_event`.
///
/// A failed file never stops the run. `cancel` is checked before each file;
/// once set, the remaining files are left untouched.
pub fn run_batch<F>(sorter: &Sorter, files: &[PathBuf], cancel: &AtomicBool, mut on_event: F) -> RunSummary
where
    F: FnMut(BatchEvent),
{
    let mut summary = RunSummary {
        total: files.len(),
        ..RunSummary::default()
    };

    for (i, path) in files.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            warn!("Run cancelled after {} of {} images", i, files.len());
            summary.cancelled = true;
            break;
        }

        let outcome = sorter.classify_and_sort(path);
        summary.record(&outcome);

        on_event(BatchEvent::Progress(Progress {
            index: i + 1,
            total: files.len(),
            path: path.clone(),
            outcome,
        }));
    }

    info!(
        "Run finished: {} sorted, {} uncategorized, {} failed",
        summary.sorted, summary.uncategorized, summary.failed
    );
    on_event(BatchEvent::Finished(summary.clone()));

    summary
}
