//! Failed-record sink
//!
//! Rejected rows are appended to a per-job CSV artifact so callers can
//! download the exact rows that failed, with the reason and originating
//! row number. The artifact is append-only for the life of the job.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::types::{Headers, ParsedRow};

/// Appends rejected rows to a per-job CSV artifact.
///
/// The header row (original columns plus `failure_reason` and
/// `row_number`) is written only when the artifact does not yet exist.
#[derive(Debug, Clone)]
pub struct FailedRecordSink {
    path: PathBuf,
}

impl FailedRecordSink {
    pub fn new(failed_dir: &Path, job_id: Uuid) -> Self {
        Self {
            path: failed_dir.join(format!("{job_id}-failed.csv")),
        }
    }

    /// Stable artifact path; the file exists only once at least one
    /// failure has been recorded.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Append one rejected row with its failure reason and row number.
    pub fn append(&self, headers: &Headers, row: &ParsedRow, reason: &str, row_number: u64) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let write_header = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        let mut writer = csv::Writer::from_writer(file);

        if write_header {
            let mut header: Vec<&str> = headers.names().iter().map(String::as_str).collect();
            header.push("failure_reason");
            header.push("row_number");
            writer
                .write_record(&header)
                .context("Failed to write artifact header")?;
        }

        let row_number = row_number.to_string();
        let mut record: Vec<&str> = row.values().iter().map(String::as_str).collect();
        record.push(reason);
        record.push(&row_number);
        writer
            .write_record(&record)
            .context("Failed to write failed record")?;
        writer.flush().context("Failed to flush failed record")?;

        Ok(())
    }

    /// Delete the artifact if present. Safe to call repeatedly.
    pub fn remove(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
