//! Batch processor behavior tests
//!
//! Drive the streaming processor through scripted row handlers: batching,
//! duplicate suppression, failure isolation, cancellation boundaries, and
//! progress monotonicity, all without a database.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use uuid::Uuid;

use sims_server::ingest::{
    BatchProcessor, ParsedRow, ProcessorOptions, Progress, RowHandler, RowOutcome,
};

const HEADER: &str = "Matric Number,Last Name,First Name,Gender,DoB,Year Of Entry,Department,Outcome";

fn write_csv(dir: &Path, rows: &[&str]) -> PathBuf {
    let path = dir.join("upload.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "{HEADER}").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    path
}

fn options(batch_size: usize) -> ProcessorOptions {
    ProcessorOptions {
        dry_run: false,
        batch_size,
        batch_pause: None,
    }
}

/// Handler scripted by the row's `Outcome` column: `fail` rejects the
/// row, `nochange` reports a no-op merge, anything else a write.
#[derive(Default)]
struct ScriptedHandler {
    handled: AtomicU64,
    saw_dry_run: AtomicBool,
}

#[async_trait]
impl RowHandler for ScriptedHandler {
    async fn handle_row(&self, row: &ParsedRow, _row_number: u64, dry_run: bool) -> Result<RowOutcome> {
        self.handled.fetch_add(1, Ordering::SeqCst);
        if dry_run {
            self.saw_dry_run.store(true, Ordering::SeqCst);
        }
        match row.field("outcome") {
            "fail" => bail!("scripted failure"),
            "nochange" => Ok(RowOutcome::NoChange),
            _ => Ok(RowOutcome::Written),
        }
    }
}

#[tokio::test]
async fn test_successful_run_reaches_completed_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(
        dir.path(),
        &[
            "A1,Doe,John,Male,1995-05-15,2023,CS,ok",
            "A2,Poe,Jane,Female,1996-06-16,2023,CS,ok",
            "A3,Roe,Jim,Male,1997-07-17,2023,CS,ok",
        ],
    );

    let handler = Arc::new(ScriptedHandler::default());
    let (processor, rx) =
        BatchProcessor::new(Uuid::new_v4(), options(2), handler.clone(), dir.path());
    processor.process_file(&path).await.unwrap();

    let progress = processor.progress();
    assert!(progress.is_complete);
    assert_eq!(progress.total_records, 3);
    assert_eq!(progress.processed_records, 3);
    assert_eq!(progress.inserted_records, 3);
    assert_eq!(progress.failed_records, 0);
    assert_eq!(progress.percent, 100);
    assert!(progress.completed_at.is_some());
    assert_eq!(progress.message, "Import complete: 3 inserted, 0 failed, 3 processed");

    // Subscribers see the same terminal snapshot.
    assert!(rx.borrow().is_complete);
    assert_eq!(handler.handled.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_missing_required_header_rejects_job_before_any_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("upload.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    // DoB column is absent.
    writeln!(file, "Matric Number,Last Name,First Name,Gender,Year Of Entry,Department").unwrap();
    writeln!(file, "A1,Doe,John,Male,2023,CS").unwrap();
    drop(file);

    let handler = Arc::new(ScriptedHandler::default());
    let (processor, _rx) =
        BatchProcessor::new(Uuid::new_v4(), options(500), handler.clone(), dir.path());
    let result = processor.process_file(&path).await;

    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("dob"));

    let progress = processor.progress();
    assert!(progress.is_complete);
    assert!(progress.message.starts_with("Import failed"));
    assert_eq!(progress.processed_records, 0);
    assert_eq!(handler.handled.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_bad_row_never_aborts_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(
        dir.path(),
        &[
            "A1,Doe,John,Male,1995-05-15,2023,CS,ok",
            "A2,Poe,Jane,Female,bad-date,2023,CS,fail",
            "A3,Roe,Jim,Male,1997-07-17,2023,CS,ok",
        ],
    );

    let handler = Arc::new(ScriptedHandler::default());
    let (processor, _rx) =
        BatchProcessor::new(Uuid::new_v4(), options(500), handler.clone(), dir.path());
    processor.process_file(&path).await.unwrap();

    let progress = processor.progress();
    assert!(progress.is_complete);
    assert_eq!(progress.processed_records, 3);
    assert_eq!(progress.inserted_records, 2);
    assert_eq!(progress.failed_records, 1);

    let errors = processor.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("row 2"));
    assert!(errors[0].contains("scripted failure"));
}

#[tokio::test]
async fn test_failed_artifact_carries_row_reason_and_number() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(
        dir.path(),
        &[
            "A1,Doe,John,Male,1995-05-15,2023,CS,ok",
            "A2,Poe,Jane,Female,1996-06-16,2023,CS,fail",
        ],
    );

    let handler = Arc::new(ScriptedHandler::default());
    let (processor, _rx) =
        BatchProcessor::new(Uuid::new_v4(), options(500), handler, dir.path());

    assert!(processor.failed_artifact().is_none());
    processor.process_file(&path).await.unwrap();

    let artifact = processor.failed_artifact().expect("artifact should exist");
    let content = std::fs::read_to_string(artifact).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], format!("{HEADER},failure_reason,row_number"));
    assert!(lines[1].starts_with("A2,Poe,Jane"));
    assert!(lines[1].contains("scripted failure"));
    assert!(lines[1].ends_with(",2"));
}

#[tokio::test]
async fn test_duplicate_matric_within_batch_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    // Duplicate identifier in the same batch plus one bad row: exactly
    // one write occurs, all three rows count as processed.
    let path = write_csv(
        dir.path(),
        &[
            "A1,Doe,John,Male,1995-05-15,2023,CS,ok",
            "A1,Dup,Dup,Male,1995-05-15,2023,CS,ok",
            "A2,X,Y,Unknown,bad-date,2023,CS,fail",
        ],
    );

    let handler = Arc::new(ScriptedHandler::default());
    let (processor, _rx) =
        BatchProcessor::new(Uuid::new_v4(), options(500), handler.clone(), dir.path());
    processor.process_file(&path).await.unwrap();

    let progress = processor.progress();
    assert_eq!(progress.processed_records, 3);
    assert_eq!(progress.inserted_records, 1);
    assert_eq!(progress.failed_records, 1);

    // The duplicate row never reached the handler.
    assert_eq!(handler.handled.load(Ordering::SeqCst), 2);

    let artifact = processor.failed_artifact().expect("artifact should exist");
    let content = std::fs::read_to_string(artifact).unwrap();
    assert_eq!(content.lines().count(), 2);
    assert!(content.lines().nth(1).unwrap().starts_with("A2"));
}

#[tokio::test]
async fn test_duplicates_across_batches_reach_storage() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(
        dir.path(),
        &[
            "A1,Doe,John,Male,1995-05-15,2023,CS,ok",
            "A1,Doe,John,Male,1995-05-15,2023,CS,nochange",
        ],
    );

    // Batch size 1 puts the duplicate in a different batch, so it is not
    // pre-filtered; the storage layer's existence check decides.
    let handler = Arc::new(ScriptedHandler::default());
    let (processor, _rx) =
        BatchProcessor::new(Uuid::new_v4(), options(1), handler.clone(), dir.path());
    processor.process_file(&path).await.unwrap();

    assert_eq!(handler.handled.load(Ordering::SeqCst), 2);
    let progress = processor.progress();
    assert_eq!(progress.processed_records, 2);
    assert_eq!(progress.inserted_records, 1);
    assert_eq!(progress.failed_records, 0);
}

#[tokio::test]
async fn test_dry_run_counts_notional_inserts() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), &["A1,Doe,John,Male,1995-05-15,2023,CS,ok"]);

    let handler = Arc::new(ScriptedHandler::default());
    let (processor, _rx) = BatchProcessor::new(
        Uuid::new_v4(),
        ProcessorOptions {
            dry_run: true,
            batch_size: 500,
            batch_pause: None,
        },
        handler.clone(),
        dir.path(),
    );
    processor.process_file(&path).await.unwrap();

    assert!(handler.saw_dry_run.load(Ordering::SeqCst));
    assert_eq!(processor.progress().inserted_records, 1);
}

/// Handler that cancels its own processor after a fixed number of rows.
struct CancellingHandler {
    cancel_after: u64,
    handled: AtomicU64,
    processor: OnceLock<Arc<BatchProcessor>>,
}

#[async_trait]
impl RowHandler for CancellingHandler {
    async fn handle_row(&self, _row: &ParsedRow, _row_number: u64, _dry_run: bool) -> Result<RowOutcome> {
        let handled = self.handled.fetch_add(1, Ordering::SeqCst) + 1;
        if handled == self.cancel_after {
            if let Some(processor) = self.processor.get() {
                processor.cancel();
            }
        }
        Ok(RowOutcome::Written)
    }
}

#[tokio::test]
async fn test_cancellation_preserves_in_flight_rows_and_starts_no_new_batch() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(
        dir.path(),
        &[
            "A1,Doe,John,Male,1995-05-15,2023,CS,ok",
            "A2,Poe,Jane,Female,1996-06-16,2023,CS,ok",
            "A3,Roe,Jim,Male,1997-07-17,2023,CS,ok",
            "A4,Soe,Joe,Male,1998-08-18,2023,CS,ok",
            "A5,Toe,Jan,Female,1999-09-19,2023,CS,ok",
            "A6,Woe,Jen,Female,2000-10-20,2023,CS,ok",
        ],
    );

    let handler = Arc::new(CancellingHandler {
        cancel_after: 2,
        handled: AtomicU64::new(0),
        processor: OnceLock::new(),
    });
    let (processor, _rx) = BatchProcessor::new(
        Uuid::new_v4(),
        options(2),
        handler.clone() as Arc<dyn RowHandler>,
        dir.path(),
    );
    let processor = Arc::new(processor);
    handler.processor.set(processor.clone()).ok().unwrap();

    processor.process_file(&path).await.unwrap();

    // Rows 1-2 (the batch in flight) are preserved; no later batch starts.
    assert_eq!(handler.handled.load(Ordering::SeqCst), 2);
    let progress = processor.progress();
    assert!(progress.is_complete);
    assert_eq!(progress.processed_records, 2);
    assert_eq!(progress.inserted_records, 2);
    assert!(progress.message.contains("cancelled"));
}

#[tokio::test]
async fn test_cancel_before_start_processes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), &["A1,Doe,John,Male,1995-05-15,2023,CS,ok"]);

    let handler = Arc::new(ScriptedHandler::default());
    let (processor, _rx) =
        BatchProcessor::new(Uuid::new_v4(), options(500), handler.clone(), dir.path());
    processor.cancel();
    processor.process_file(&path).await.unwrap();

    assert_eq!(handler.handled.load(Ordering::SeqCst), 0);
    let progress = processor.progress();
    assert!(progress.is_complete);
    assert_eq!(progress.processed_records, 0);
    assert!(progress.message.contains("cancelled"));
}

/// Handler that records a progress snapshot after every row.
struct RecordingHandler {
    snapshots: Mutex<Vec<Progress>>,
    processor: OnceLock<Arc<BatchProcessor>>,
}

#[async_trait]
impl RowHandler for RecordingHandler {
    async fn handle_row(&self, row: &ParsedRow, _row_number: u64, _dry_run: bool) -> Result<RowOutcome> {
        if let Some(processor) = self.processor.get() {
            self.snapshots.lock().unwrap().push(processor.progress());
        }
        match row.field("outcome") {
            "fail" => bail!("scripted failure"),
            _ => Ok(RowOutcome::Written),
        }
    }
}

#[tokio::test]
async fn test_progress_counters_are_monotone_and_percent_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let rows: Vec<String> = (0..20)
        .map(|i| {
            let outcome = if i % 5 == 4 { "fail" } else { "ok" };
            format!("A{i},Doe,John,Male,1995-05-15,2023,CS,{outcome}")
        })
        .collect();
    let row_refs: Vec<&str> = rows.iter().map(String::as_str).collect();
    let path = write_csv(dir.path(), &row_refs);

    let handler = Arc::new(RecordingHandler {
        snapshots: Mutex::new(Vec::new()),
        processor: OnceLock::new(),
    });
    let (processor, _rx) = BatchProcessor::new(
        Uuid::new_v4(),
        options(6),
        handler.clone() as Arc<dyn RowHandler>,
        dir.path(),
    );
    let processor = Arc::new(processor);
    handler.processor.set(processor.clone()).ok().unwrap();

    processor.process_file(&path).await.unwrap();

    let mut snapshots = handler.snapshots.lock().unwrap().clone();
    snapshots.push(processor.progress());

    for pair in snapshots.windows(2) {
        assert!(pair[1].processed_records >= pair[0].processed_records);
        assert!(pair[1].inserted_records >= pair[0].inserted_records);
        assert!(pair[1].failed_records >= pair[0].failed_records);
        assert!(pair[1].percent >= pair[0].percent);
    }
    for snapshot in &snapshots {
        assert!(snapshot.percent <= 100);
    }

    let terminal = processor.progress();
    assert_eq!(terminal.processed_records, 20);
    assert_eq!(terminal.failed_records, 4);
    assert_eq!(terminal.inserted_records, 16);
    assert_eq!(terminal.percent, 100);
}

#[tokio::test]
async fn test_last_partial_batch_is_flushed() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(
        dir.path(),
        &[
            "A1,Doe,John,Male,1995-05-15,2023,CS,ok",
            "A2,Poe,Jane,Female,1996-06-16,2023,CS,ok",
            "A3,Roe,Jim,Male,1997-07-17,2023,CS,ok",
            "A4,Soe,Joe,Male,1998-08-18,2023,CS,ok",
            "A5,Toe,Jan,Female,1999-09-19,2023,CS,ok",
        ],
    );

    let handler = Arc::new(ScriptedHandler::default());
    let (processor, _rx) =
        BatchProcessor::new(Uuid::new_v4(), options(2), handler.clone(), dir.path());
    processor.process_file(&path).await.unwrap();

    // 2 + 2 + the trailing partial batch of 1.
    assert_eq!(handler.handled.load(Ordering::SeqCst), 5);
    assert_eq!(processor.progress().processed_records, 5);
}
