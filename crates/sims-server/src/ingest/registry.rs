//! In-memory job registry
//!
//! Process-wide table of import jobs. The registry creates jobs, wires
//! their progress channels, supports cooperative cancellation, and owns
//! cleanup: a periodic sweep purges completed jobs past the retention
//! window and force-purges jobs stuck running past the staleness
//! ceiling. State is purely in-memory; a process restart loses all job
//! state, which is an accepted limitation of the single-instance design.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use uuid::Uuid;

use crate::config::IngestConfig;

use super::processor::{BatchProcessor, ProcessorOptions, RowHandler};
use super::progress::Progress;

/// Caller-supplied options for a new job.
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    pub dry_run: bool,
    /// Overrides the configured default batch size when set.
    pub batch_size: Option<usize>,
}

/// Handle returned from job creation.
pub struct CreatedJob {
    pub id: Uuid,
    pub processor: Arc<BatchProcessor>,
}

struct JobEntry {
    processor: Arc<BatchProcessor>,
    progress_rx: watch::Receiver<Progress>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

/// Registry of all import jobs in this process.
///
/// Cheap to clone; clones share the same job table.
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<Uuid, JobEntry>>>,
    config: IngestConfig,
    handler: Arc<dyn RowHandler>,
    sweeper_started: Arc<AtomicBool>,
}

impl JobRegistry {
    pub fn new(config: IngestConfig, handler: Arc<dyn RowHandler>) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            config,
            handler,
            sweeper_started: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a job and register it. Never fails; the caller is
    /// responsible for invoking `process_file` on the returned
    /// processor asynchronously.
    pub async fn create_job(&self, options: JobOptions) -> CreatedJob {
        let id = Uuid::new_v4();
        let processor_options = ProcessorOptions {
            dry_run: options.dry_run,
            batch_size: options.batch_size.unwrap_or(self.config.batch_size).max(1),
            batch_pause: self.config.batch_pause(),
        };

        let (processor, progress_rx) = BatchProcessor::new(
            id,
            processor_options,
            self.handler.clone(),
            &self.config.failed_dir,
        );
        let processor = Arc::new(processor);

        self.jobs.write().await.insert(
            id,
            JobEntry {
                processor: processor.clone(),
                progress_rx: progress_rx.clone(),
                created_at: Utc::now(),
                completed_at: None,
            },
        );

        tracing::info!(job_id = %id, dry_run = options.dry_run, "Import job created");

        // Stamp the completion time on the first completed snapshot.
        let registry = self.clone();
        let mut completion_rx = progress_rx;
        tokio::spawn(async move {
            loop {
                if completion_rx.borrow().is_complete {
                    registry.stamp_completed(id).await;
                    break;
                }
                if completion_rx.changed().await.is_err() {
                    break;
                }
            }
        });

        self.start_sweeper();

        CreatedJob { id, processor }
    }

    /// Latest progress snapshot for a job, or `None` when unknown.
    pub async fn get_progress(&self, id: Uuid) -> Option<Progress> {
        self.jobs
            .read()
            .await
            .get(&id)
            .map(|entry| entry.progress_rx.borrow().clone())
    }

    /// Subscribe to a job's progress stream. Any number of observers may
    /// hold receivers; the processor does not know how many exist.
    pub async fn subscribe(&self, id: Uuid) -> Option<watch::Receiver<Progress>> {
        self.jobs
            .read()
            .await
            .get(&id)
            .map(|entry| entry.progress_rx.clone())
    }

    /// Processor handle for a job, or `None` when unknown.
    pub async fn get_processor(&self, id: Uuid) -> Option<Arc<BatchProcessor>> {
        self.jobs
            .read()
            .await
            .get(&id)
            .map(|entry| entry.processor.clone())
    }

    /// Signal cooperative cancellation. Returns false when the job is
    /// absent or already complete; the flag is only read at the next
    /// batch or row boundary, so this never force-terminates anything.
    pub async fn cancel_job(&self, id: Uuid) -> bool {
        let jobs = self.jobs.read().await;
        match jobs.get(&id) {
            None => false,
            Some(entry) if entry.progress_rx.borrow().is_complete => false,
            Some(entry) => {
                entry.processor.cancel();
                true
            },
        }
    }

    /// Remove a job and its failure artifact. Idempotent.
    pub async fn cleanup(&self, id: Uuid) {
        let removed = self.jobs.write().await.remove(&id);
        if let Some(entry) = removed {
            if let Err(e) = entry.processor.remove_failed_artifact() {
                tracing::warn!(job_id = %id, error = %e, "Failed to remove failure artifact");
            }
            tracing::info!(job_id = %id, "Import job cleaned up");
        }
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// One sweep pass: purge completed jobs past the retention window
    /// and force-purge jobs running past the staleness ceiling.
    pub async fn sweep(&self) {
        let now = Utc::now();
        let retention = ChronoDuration::seconds(self.config.retention_secs as i64);
        let staleness = ChronoDuration::seconds(self.config.stale_job_secs as i64);

        let mut purge: Vec<Uuid> = Vec::new();
        {
            let jobs = self.jobs.read().await;
            for (id, entry) in jobs.iter() {
                let snapshot = entry.progress_rx.borrow().clone();
                if snapshot.is_complete {
                    let done = entry
                        .completed_at
                        .or(snapshot.completed_at)
                        .unwrap_or(now);
                    if now - done >= retention {
                        purge.push(*id);
                    }
                } else if now - entry.created_at >= staleness {
                    tracing::warn!(job_id = %id, "Purging stale job still marked running");
                    entry.processor.cancel();
                    purge.push(*id);
                }
            }
        }

        for id in purge {
            self.cleanup(id).await;
        }
    }

    async fn stamp_completed(&self, id: Uuid) {
        let mut jobs = self.jobs.write().await;
        if let Some(entry) = jobs.get_mut(&id) {
            if entry.completed_at.is_none() {
                let snapshot = entry.progress_rx.borrow().clone();
                entry.completed_at = snapshot.completed_at.or_else(|| Some(Utc::now()));
                tracing::debug!(job_id = %id, "Completion time stamped");
            }
        }
    }

    /// Start the periodic sweep once per registry; later calls no-op.
    fn start_sweeper(&self) {
        if self.sweeper_started.swap(true, Ordering::Relaxed) {
            return;
        }
        let registry = self.clone();
        let interval = Duration::from_secs(self.config.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick fires immediately; skip it so a fresh job is
            // never swept in the same instant it was created.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                registry.sweep().await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{ParsedRow, RowOutcome};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::io::Write;

    struct NoopHandler;

    #[async_trait]
    impl RowHandler for NoopHandler {
        async fn handle_row(
            &self,
            _row: &ParsedRow,
            _row_number: u64,
            _dry_run: bool,
        ) -> Result<RowOutcome> {
            Ok(RowOutcome::Written)
        }
    }

    fn test_config(dir: &std::path::Path) -> IngestConfig {
        IngestConfig {
            batch_size: 500,
            retention_secs: 0,
            stale_job_secs: 0,
            sweep_interval_secs: 3600,
            upload_dir: dir.join("uploads"),
            failed_dir: dir.join("failed"),
            batch_pause_ms: None,
        }
    }

    fn registry(dir: &std::path::Path) -> JobRegistry {
        JobRegistry::new(test_config(dir), Arc::new(NoopHandler))
    }

    fn write_csv(dir: &std::path::Path, rows: &[&str]) -> std::path::PathBuf {
        let path = dir.join("upload.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "Matric Number,Last Name,First Name,Gender,DoB,Year Of Entry,Department"
        )
        .unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
        path
    }

    #[tokio::test]
    async fn test_create_and_get_progress() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());

        let job = registry.create_job(JobOptions::default()).await;
        let progress = registry.get_progress(job.id).await.unwrap();
        assert_eq!(progress.job_id, job.id);
        assert!(!progress.is_complete);

        assert!(registry.get_progress(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_semantics() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());

        assert!(!registry.cancel_job(Uuid::new_v4()).await);

        let job = registry.create_job(JobOptions::default()).await;
        assert!(registry.cancel_job(job.id).await);

        // Run a job to completion; a completed job cannot be cancelled.
        let job = registry.create_job(JobOptions::default()).await;
        let path = write_csv(dir.path(), &["A1,Doe,John,Male,1995-05-15,2023,CS"]);
        job.processor.process_file(&path).await.unwrap();
        assert!(!registry.cancel_job(job.id).await);
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());

        let job = registry.create_job(JobOptions::default()).await;
        registry.cleanup(job.id).await;
        assert!(registry.get_progress(job.id).await.is_none());
        registry.cleanup(job.id).await;
    }

    #[tokio::test]
    async fn test_sweep_purges_completed_jobs_past_retention() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());

        let job = registry.create_job(JobOptions::default()).await;
        let path = write_csv(dir.path(), &["A1,Doe,John,Male,1995-05-15,2023,CS"]);
        job.processor.process_file(&path).await.unwrap();

        // Retention window is zero in the test config.
        registry.sweep().await;
        assert_eq!(registry.job_count().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_purges_stale_running_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());

        // Created but never processed: still "running" past the (zero)
        // staleness ceiling.
        let job = registry.create_job(JobOptions::default()).await;
        registry.sweep().await;
        assert_eq!(registry.job_count().await, 0);
        assert!(registry.get_progress(job.id).await.is_none());
    }
}
