//! Student-record ingestion pipeline
//!
//! The pipeline streams an uploaded CSV file through validation,
//! reference resolution and insert-or-merge storage writes, one job per
//! file:
//!
//! 1. [`registry::JobRegistry`] creates and tracks jobs
//! 2. [`processor::BatchProcessor`] streams, batches and drives rows
//! 3. [`transform::RecordTransformer`] validates and normalizes rows
//! 4. [`lookups::LookupResolver`] resolves denormalized reference text
//! 5. [`reg_number::RegNumberGenerator`] mints registration numbers
//! 6. [`upsert::StudentUpserter`] performs per-record transactions
//! 7. [`failures::FailedRecordSink`] keeps the rejected-row artifact
//!
//! Batches within a job are processed sequentially and records one at a
//! time; each record's transaction acquires its own pooled connection,
//! so a mid-batch failure never rolls back earlier records.

pub mod failures;
pub mod lookups;
pub mod processor;
pub mod progress;
pub mod registry;
pub mod reg_number;
pub mod transform;
pub mod types;
pub mod upsert;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;

pub use processor::{BatchProcessor, ProcessorOptions, RowHandler};
pub use progress::Progress;
pub use registry::{CreatedJob, JobOptions, JobRegistry};
pub use types::{CanonicalRecord, ParsedRow, RowOutcome, REQUIRED_HEADERS};

use lookups::LookupResolver;
use reg_number::RegNumberGenerator;
use transform::RecordTransformer;
use upsert::StudentUpserter;

/// Production row handler: transform the row, then upsert it.
///
/// In dry-run mode the record is validated and resolved but storage is
/// never touched; the row counts as a notional insert.
pub struct StudentRowHandler {
    transformer: RecordTransformer,
    upserter: StudentUpserter,
}

impl StudentRowHandler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            transformer: RecordTransformer::new(
                LookupResolver::new(pool.clone()),
                RegNumberGenerator::new(pool.clone()),
            ),
            upserter: StudentUpserter::new(pool),
        }
    }
}

#[async_trait]
impl RowHandler for StudentRowHandler {
    async fn handle_row(
        &self,
        row: &ParsedRow,
        _row_number: u64,
        dry_run: bool,
    ) -> Result<RowOutcome> {
        let record = self.transformer.transform(row).await?;
        if dry_run {
            return Ok(RowOutcome::Written);
        }
        self.upserter.upsert(&record).await
    }
}
