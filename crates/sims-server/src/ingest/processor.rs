//! Streaming batch processor
//!
//! Owns the end-to-end pipeline for one import job: counts records,
//! stream-parses the file, groups rows into batches, drives the row
//! handler per row, collects failures, and publishes progress. Batches
//! run sequentially and rows within a batch one at a time, so peak
//! database load stays bounded and progress moves at a readable cadence.
//!
//! State machine: Created -> Counting -> Initializing -> Processing ->
//! {Completed | Cancelled | Failed}. A single bad row never aborts the
//! job; only a missing required header or an unreadable upload does.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

use super::failures::FailedRecordSink;
use super::progress::{Progress, ProgressTracker};
use super::types::{Headers, ParsedRow, RowOutcome};

/// Per-job processing options.
#[derive(Debug, Clone)]
pub struct ProcessorOptions {
    /// Validate and resolve every row without touching storage.
    pub dry_run: bool,
    /// Rows per batch. The last partial batch is always flushed.
    pub batch_size: usize,
    /// Optional pause between batches. The original system paced batches
    /// for UI visibility; here it is explicit and off by default.
    pub batch_pause: Option<Duration>,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            batch_size: crate::config::DEFAULT_BATCH_SIZE,
            batch_pause: None,
        }
    }
}

/// Storage-side handling of one validated row.
///
/// The processor drives transformation and upsert through this seam; the
/// production implementation wires the record transformer and upserter,
/// and tests substitute scripted handlers.
#[async_trait]
pub trait RowHandler: Send + Sync {
    /// Handle one raw row. An `Err` fails the row, not the job.
    async fn handle_row(&self, row: &ParsedRow, row_number: u64, dry_run: bool)
        -> Result<RowOutcome>;
}

/// Drives one import job over one uploaded file.
pub struct BatchProcessor {
    job_id: Uuid,
    options: ProcessorOptions,
    handler: Arc<dyn RowHandler>,
    sink: FailedRecordSink,
    tracker: Mutex<ProgressTracker>,
    cancelled: AtomicBool,
    errors: Mutex<Vec<String>>,
}

impl BatchProcessor {
    /// Construct a processor for a job. Seeds and emits the initial
    /// progress snapshot so observers attached early see a non-empty
    /// state.
    pub fn new(
        job_id: Uuid,
        options: ProcessorOptions,
        handler: Arc<dyn RowHandler>,
        failed_dir: &Path,
    ) -> (Self, watch::Receiver<Progress>) {
        let (tracker, rx) = ProgressTracker::new(job_id);
        let processor = Self {
            job_id,
            options,
            handler,
            sink: FailedRecordSink::new(failed_dir, job_id),
            tracker: Mutex::new(tracker),
            cancelled: AtomicBool::new(false),
            errors: Mutex::new(Vec::new()),
        };
        (processor, rx)
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Latest progress snapshot (a copy; mutating it has no effect).
    pub fn progress(&self) -> Progress {
        self.with_tracker(|t| t.snapshot())
    }

    /// Failure reasons collected so far, one entry per rejected row.
    pub fn errors(&self) -> Vec<String> {
        self.errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Path of the failed-record artifact, present only once at least
    /// one failure has been recorded.
    pub fn failed_artifact(&self) -> Option<PathBuf> {
        self.sink.exists().then(|| self.sink.path().to_path_buf())
    }

    /// Remove the failed-record artifact, if any.
    pub fn remove_failed_artifact(&self) -> std::io::Result<()> {
        self.sink.remove()
    }

    /// Request cooperative cancellation. The flag is read at the next
    /// batch or row boundary; this never blocks.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
        self.with_tracker(|t| t.set_message("Cancelling import"));
        tracing::info!(job_id = %self.job_id, "Cancellation requested");
    }

    /// Process the file at `path` to a terminal state.
    ///
    /// Returns `Err` only for job-level failures (unreadable upload,
    /// missing required headers); per-row failures are absorbed into the
    /// failure counters.
    pub async fn process_file(&self, path: &Path) -> Result<()> {
        match self.run(path).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(job_id = %self.job_id, error = %e, "Import job failed");
                self.with_tracker(|t| t.fail(format!("Import failed: {e:#}")));
                Err(e)
            },
        }
    }

    async fn run(&self, path: &Path) -> Result<()> {
        tracing::info!(job_id = %self.job_id, path = %path.display(), "Starting import");

        // Counting pass: best effort. On failure the total stays at zero
        // and is derived from the processed count at the end.
        self.with_tracker(|t| t.set_message("Counting records"));
        match Self::count_rows(path) {
            Ok(total) => {
                tracing::debug!(job_id = %self.job_id, total, "Counted data rows");
                self.with_tracker(|t| t.set_total(total));
            },
            Err(e) => {
                tracing::warn!(
                    job_id = %self.job_id,
                    error = %e,
                    "Row counting failed, total will be back-filled after processing"
                );
            },
        }

        // Give a downstream observer a beat to attach before data flows.
        self.with_tracker(|t| t.set_message("Initializing import"));

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Failed to open upload {}", path.display()))?;

        let header_row = reader
            .headers()
            .context("Failed to read header row")?
            .clone();
        let headers = Arc::new(Headers::new(
            header_row.iter().map(str::to_string).collect(),
        ));

        let missing = headers.missing_required();
        if !missing.is_empty() {
            bail!("missing required column(s): {}", missing.join(", "));
        }

        self.with_tracker(|t| t.set_message("Processing records"));

        let mut batch: Vec<(u64, ParsedRow)> = Vec::with_capacity(self.options.batch_size);
        let mut row_number = 0u64;
        let mut cancelled = false;

        for record in reader.records() {
            row_number += 1;
            match record {
                Ok(record) => batch.push((row_number, ParsedRow::new(headers.clone(), &record))),
                Err(e) => {
                    // A malformed line fails that row, never the job.
                    let placeholder = ParsedRow::from_values(headers.clone(), Vec::new());
                    self.record_failure(
                        &headers,
                        &placeholder,
                        &format!("malformed row: {e}"),
                        row_number,
                    );
                    continue;
                },
            }

            if batch.len() >= self.options.batch_size {
                cancelled = self.process_batch(&headers, &batch).await?;
                batch.clear();
                if cancelled {
                    break;
                }
            }
        }

        if !cancelled && !batch.is_empty() {
            cancelled = self.process_batch(&headers, &batch).await?;
        }

        let snapshot = self.progress();
        if cancelled {
            let message = if snapshot.total_records > 0 {
                format!(
                    "Import cancelled after {} of {} records",
                    snapshot.processed_records, snapshot.total_records
                )
            } else {
                format!("Import cancelled after {} records", snapshot.processed_records)
            };
            tracing::info!(
                job_id = %self.job_id,
                processed = snapshot.processed_records,
                "Import cancelled"
            );
            self.with_tracker(|t| t.complete_cancelled(message));
            return Ok(());
        }

        let message = format!(
            "Import complete: {} inserted, {} failed, {} processed",
            snapshot.inserted_records, snapshot.failed_records, snapshot.processed_records
        );
        tracing::info!(
            job_id = %self.job_id,
            processed = snapshot.processed_records,
            inserted = snapshot.inserted_records,
            failed = snapshot.failed_records,
            "Import complete"
        );
        self.with_tracker(|t| t.complete(message));
        Ok(())
    }

    /// Process one batch sequentially. Returns true when cancellation was
    /// observed; the caller starts no further batches. Only an unreachable
    /// store is an error here; row-level failures are absorbed.
    async fn process_batch(
        &self,
        headers: &Arc<Headers>,
        batch: &[(u64, ParsedRow)],
    ) -> Result<bool> {
        if self.is_cancelled() {
            return Ok(true);
        }

        // Rows repeating an identifier already seen in this batch are
        // skipped; duplicates across batches are left to the upserter's
        // existence check.
        let mut seen: HashSet<String> = HashSet::with_capacity(batch.len());

        for (row_number, row) in batch {
            if self.is_cancelled() {
                return Ok(true);
            }

            let matric = row.field("matric number").to_uppercase();
            if !seen.insert(matric) {
                tracing::debug!(
                    job_id = %self.job_id,
                    row_number,
                    "Duplicate matric number within batch, skipping"
                );
                self.with_tracker(|t| t.record_processed());
                continue;
            }

            match self
                .handler
                .handle_row(row, *row_number, self.options.dry_run)
                .await
            {
                Ok(RowOutcome::Written) => self.with_tracker(|t| {
                    t.record_inserted();
                    t.record_processed();
                }),
                Ok(RowOutcome::NoChange) => self.with_tracker(|t| t.record_processed()),
                Err(e) if is_storage_unreachable(&e) => {
                    // A connection-level outage is a job failure, not a
                    // bad row.
                    return Err(e.context("storage unreachable"));
                },
                Err(e) => {
                    tracing::warn!(
                        job_id = %self.job_id,
                        row_number,
                        error = %e,
                        "Row rejected"
                    );
                    self.record_failure(headers, row, &format!("{e:#}"), *row_number);
                },
            }
        }

        let snapshot = self.progress();
        let message = if snapshot.total_records > 0 {
            format!(
                "Processed {} of {} records",
                snapshot.processed_records, snapshot.total_records
            )
        } else {
            format!("Processed {} records", snapshot.processed_records)
        };
        self.with_tracker(|t| t.set_message(message));

        if let Some(pause) = self.options.batch_pause {
            tokio::time::sleep(pause).await;
        }

        Ok(false)
    }

    fn record_failure(&self, headers: &Headers, row: &ParsedRow, reason: &str, row_number: u64) {
        if let Err(e) = self.sink.append(headers, row, reason, row_number) {
            tracing::error!(
                job_id = %self.job_id,
                error = %e,
                "Failed to write failed-record artifact"
            );
        }
        self.errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(format!("row {row_number}: {reason}"));
        self.with_tracker(|t| {
            t.record_failed();
            t.record_processed();
        });
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    fn with_tracker<R>(&self, f: impl FnOnce(&mut ProgressTracker) -> R) -> R {
        let mut tracker = self.tracker.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut tracker)
    }

    /// Count data rows (header excluded) in a separate streaming pass.
    fn count_rows(path: &Path) -> Result<u64> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;
        let mut count = 0u64;
        for record in reader.records() {
            record?;
            count += 1;
        }
        Ok(count)
    }
}

/// Connection-level storage errors abort the job; anything else scoped
/// to a row (constraint violations, per-record transaction failures)
/// stays a row failure.
fn is_storage_unreachable(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<sqlx::Error>(),
        Some(sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_))
    )
}
