//! # Fill Orchestrator
//!
//! Fills every mapped sheet of one open document from one record.
//!
//! ## Pipeline
//!
//! ```text
//! TemplateMapping + Record
//!        │ partition()
//!        ▼
//!  FillUnit per sheet ──► bounded worker pool (Semaphore)
//!                               │ plan(): normalize once per field
//!                               │ chunks(batch_size)
//!                               ▼
//!                        DocumentWriter (single thread) ──► DocumentHandle
//! ```
//!
//! Computing what to write runs concurrently; applying it never does. Each
//! sheet reports its own [`SheetOutcome`]. A failing cell is logged and
//! counted, a failing sheet is reported as failed, and neither stops the
//! other sheets. Batching only paces traffic to the writer: a batch size of
//! one yields the same document.

mod cancel;
mod plan;
mod writer;

pub use cancel::CancelToken;
pub use plan::{ChoiceMismatch, FillUnit, UnitPlan, partition};
pub use writer::{CellWrite, DocumentWriter};

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::address::CellAddress;
use crate::host::HostError;
use crate::mapping::TemplateMapping;
use crate::normalize::Record;

/// Cell writes sent to the writer per request.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Upper bound on the default worker count.
const MAX_DEFAULT_WORKERS: usize = 32;

/// `min(32, available parallelism + 4)`.
pub fn default_workers() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cpus + 4).min(MAX_DEFAULT_WORKERS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillOptions {
    pub workers: usize,
    pub batch_size: usize,
}

impl Default for FillOptions {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// A single cell that could not be written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellFailure {
    pub field: String,
    pub address: CellAddress,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SheetStatus {
    /// Every batch reached the document. Individual cells may still have failed.
    Completed,
    /// The sheet could not be worked on at all past some point.
    Failed { reason: String },
    /// Cancellation stopped the unit before all batches were sent.
    Cancelled,
}

/// Result of one [`FillUnit`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetOutcome {
    pub sheet: String,
    #[serde(flatten)]
    pub status: SheetStatus,
    pub cells_written: usize,
    pub cells_failed: Vec<CellFailure>,
    /// Writes never dispatched because the unit stopped early.
    pub cells_skipped: usize,
    /// Writes handed to the writer without an answer in time. The document
    /// may or may not hold them.
    pub cells_unconfirmed: usize,
    pub choice_mismatches: Vec<ChoiceMismatch>,
}

impl SheetOutcome {
    fn new(sheet: &str) -> Self {
        Self {
            sheet: sheet.to_string(),
            status: SheetStatus::Completed,
            cells_written: 0,
            cells_failed: Vec::new(),
            cells_skipped: 0,
            cells_unconfirmed: 0,
            choice_mismatches: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == SheetStatus::Completed
    }

    /// Completed with every cell written.
    pub fn is_clean(&self) -> bool {
        self.succeeded() && self.cells_failed.is_empty() && self.cells_unconfirmed == 0
    }
}

/// Drives [`FillUnit`]s through the worker pool.
pub struct Orchestrator {
    mapping: Arc<TemplateMapping>,
    options: FillOptions,
}

impl Orchestrator {
    pub fn new(mapping: Arc<TemplateMapping>, options: FillOptions) -> Self {
        Self {
            mapping,
            options: FillOptions {
                workers: options.workers.max(1),
                batch_size: options.batch_size.max(1),
            },
        }
    }

    pub fn options(&self) -> FillOptions {
        self.options
    }

    /// Fill every mapped sheet. Outcomes come back in mapping order.
    pub async fn fill(
        &self,
        writer: &DocumentWriter,
        record: Arc<Record>,
        cancel: &CancelToken,
    ) -> Vec<SheetOutcome> {
        let units = partition(self.mapping.sheets(), record);
        let order: HashMap<String, usize> = units
            .iter()
            .enumerate()
            .map(|(i, u)| (u.sheet.clone(), i))
            .collect();
        info!(
            sheets = units.len(),
            workers = self.options.workers,
            batch_size = self.options.batch_size,
            "filling document"
        );

        let semaphore = Arc::new(Semaphore::new(self.options.workers));
        let mut tasks = JoinSet::new();
        let mut names = HashMap::new();

        for unit in units {
            let sheet = unit.sheet.clone();
            let semaphore = semaphore.clone();
            let writer = writer.clone();
            let cancel = cancel.clone();
            let batch_size = self.options.batch_size;

            let handle = tasks.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let Some(_permit) = permit else {
                    let mut outcome = SheetOutcome::new(&unit.sheet);
                    outcome.status = SheetStatus::Cancelled;
                    outcome.cells_skipped = unit.plan().writes.len();
                    return outcome;
                };
                run_unit(unit, &writer, batch_size, &cancel).await
            });
            names.insert(handle.id(), sheet);
        }

        let mut outcomes = Vec::with_capacity(names.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, outcome)) => outcomes.push(outcome),
                Err(e) => {
                    let sheet = names.get(&e.id()).cloned().unwrap_or_default();
                    warn!(sheet = %sheet, error = %e, "fill worker aborted");
                    let mut outcome = SheetOutcome::new(&sheet);
                    outcome.status = SheetStatus::Failed {
                        reason: format!("worker aborted: {}", e),
                    };
                    outcomes.push(outcome);
                }
            }
        }

        outcomes.sort_by_key(|o| order.get(&o.sheet).copied().unwrap_or(usize::MAX));
        outcomes
    }
}

async fn run_unit(
    unit: FillUnit,
    writer: &DocumentWriter,
    batch_size: usize,
    cancel: &CancelToken,
) -> SheetOutcome {
    let plan = unit.plan();
    let mut outcome = SheetOutcome::new(&unit.sheet);
    outcome.choice_mismatches = plan.mismatches;
    for mismatch in &outcome.choice_mismatches {
        warn!(
            sheet = %unit.sheet,
            group = %mismatch.group,
            selection = %mismatch.selection,
            "selection matches no option"
        );
    }

    let total = plan.writes.len();
    let mut dispatched = 0;
    for batch in plan.writes.chunks(batch_size) {
        if cancel.is_cancelled() {
            outcome.status = SheetStatus::Cancelled;
            break;
        }

        match writer.write_cells(&unit.sheet, batch.to_vec()).await {
            Ok(failures) => {
                outcome.cells_written += batch.len() - failures.len();
                for (index, error) in failures {
                    let write = &batch[index];
                    let address = CellAddress {
                        sheet: unit.sheet.clone(),
                        coord: write.coord,
                    };
                    warn!(
                        sheet = %unit.sheet,
                        field = %write.field,
                        address = %address,
                        error = %error,
                        "cell write failed"
                    );
                    outcome.cells_failed.push(CellFailure {
                        field: write.field.clone(),
                        address,
                        reason: error.to_string(),
                    });
                }
            }
            Err(e) => {
                warn!(sheet = %unit.sheet, error = %e, "sheet fill failed");
                if let HostError::Timeout(_) = e {
                    // Already queued; the writer thread may still apply it.
                    outcome.cells_unconfirmed = batch.len();
                    dispatched += batch.len();
                }
                outcome.status = SheetStatus::Failed {
                    reason: e.to_string(),
                };
                break;
            }
        }
        dispatched += batch.len();
        tokio::task::yield_now().await;
    }

    outcome.cells_skipped = total - dispatched;
    debug!(
        sheet = %unit.sheet,
        written = outcome.cells_written,
        failed = outcome.cells_failed.len(),
        skipped = outcome.cells_skipped,
        unconfirmed = outcome.cells_unconfirmed,
        "sheet finished"
    );
    outcome
}
