//! Job progress snapshots and the single-writer tracker
//!
//! `Progress` is a value snapshot: the processor owns the only writer and
//! observers receive copies through a `tokio::sync::watch` channel, so no
//! reader ever sees a half-updated state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

/// Progress snapshot for an import job.
///
/// `percent` and the three counters are non-decreasing over the emitted
/// sequence; `is_complete` latches true and never resets.
#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub job_id: Uuid,
    /// Completion percentage, 0-100. Only meaningful before the end of
    /// the run when the up-front record count succeeded.
    pub percent: u8,
    /// Best-effort total; starts at 0 and is back-filled from the final
    /// processed count when up-front counting failed.
    pub total_records: u64,
    pub processed_records: u64,
    pub inserted_records: u64,
    pub failed_records: u64,
    /// Human-readable status line.
    pub message: String,
    pub is_complete: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Progress {
    fn seed(job_id: Uuid) -> Self {
        Self {
            job_id,
            percent: 0,
            total_records: 0,
            processed_records: 0,
            inserted_records: 0,
            failed_records: 0,
            message: "Queued for processing".to_string(),
            is_complete: false,
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Single-writer progress state for one job.
///
/// Every mutation publishes a fresh snapshot on the watch channel, so an
/// observer attached at any point sees the latest consistent state.
pub struct ProgressTracker {
    current: Progress,
    tx: watch::Sender<Progress>,
}

impl ProgressTracker {
    /// Create a tracker seeded with zero counters and an initial message,
    /// emitting the seed snapshot immediately.
    pub fn new(job_id: Uuid) -> (Self, watch::Receiver<Progress>) {
        let current = Progress::seed(job_id);
        let (tx, rx) = watch::channel(current.clone());
        (Self { current, tx }, rx)
    }

    pub fn snapshot(&self) -> Progress {
        self.current.clone()
    }

    pub fn set_total(&mut self, total: u64) {
        self.current.total_records = total;
        self.recompute_percent();
        self.emit();
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.current.message = message.into();
        self.emit();
    }

    pub fn record_processed(&mut self) {
        self.current.processed_records += 1;
        self.recompute_percent();
        self.emit();
    }

    pub fn record_inserted(&mut self) {
        self.current.inserted_records += 1;
    }

    pub fn record_failed(&mut self) {
        self.current.failed_records += 1;
    }

    /// Finalize a successful run: back-fill the total when up-front
    /// counting failed, clamp to 100% and latch completion.
    pub fn complete(&mut self, message: impl Into<String>) {
        if self.current.total_records == 0 {
            self.current.total_records = self.current.processed_records;
        }
        self.current.percent = 100;
        self.finish(message);
    }

    /// Terminal state for a cancelled run. Counters keep whatever was
    /// processed; the percentage is left where it stopped.
    pub fn complete_cancelled(&mut self, message: impl Into<String>) {
        self.finish(message);
    }

    /// Terminal state for a rejected or failed run.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.finish(message);
    }

    fn finish(&mut self, message: impl Into<String>) {
        self.current.message = message.into();
        if !self.current.is_complete {
            self.current.is_complete = true;
            self.current.completed_at = Some(Utc::now());
        }
        self.emit();
    }

    fn recompute_percent(&mut self) {
        if self.current.total_records > 0 {
            let pct = self.current.processed_records * 100 / self.current.total_records;
            // Monotone even if the file grew between the counting and
            // processing passes.
            self.current.percent = self.current.percent.max(pct.min(100) as u8);
        }
    }

    fn emit(&self) {
        // send_replace never fails even with no receivers attached.
        self.tx.send_replace(self.current.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_snapshot_is_emitted_on_creation() {
        let (tracker, rx) = ProgressTracker::new(Uuid::new_v4());
        let seen = rx.borrow().clone();
        assert_eq!(seen.percent, 0);
        assert_eq!(seen.processed_records, 0);
        assert!(!seen.is_complete);
        assert_eq!(seen.message, "Queued for processing");
        drop(tracker);
    }

    #[test]
    fn test_percent_tracks_processed_over_total() {
        let (mut tracker, rx) = ProgressTracker::new(Uuid::new_v4());
        tracker.set_total(4);
        tracker.record_processed();
        assert_eq!(rx.borrow().percent, 25);
        tracker.record_processed();
        tracker.record_processed();
        assert_eq!(rx.borrow().percent, 75);
    }

    #[test]
    fn test_percent_is_clamped_and_monotone() {
        let (mut tracker, rx) = ProgressTracker::new(Uuid::new_v4());
        tracker.set_total(2);
        for _ in 0..5 {
            tracker.record_processed();
        }
        assert_eq!(rx.borrow().percent, 100);
        // Raising the total later never lowers the published percentage.
        tracker.set_total(100);
        assert_eq!(rx.borrow().percent, 100);
    }

    #[test]
    fn test_complete_backfills_total_and_latches() {
        let (mut tracker, rx) = ProgressTracker::new(Uuid::new_v4());
        tracker.record_processed();
        tracker.record_processed();
        tracker.complete("done");
        let snapshot = rx.borrow().clone();
        assert_eq!(snapshot.total_records, 2);
        assert_eq!(snapshot.percent, 100);
        assert!(snapshot.is_complete);
        assert!(snapshot.completed_at.is_some());

        // A later terminal transition does not reset the latch or stamp a
        // new completion time.
        let first_completed_at = snapshot.completed_at;
        tracker.fail("too late");
        let snapshot = rx.borrow().clone();
        assert!(snapshot.is_complete);
        assert_eq!(snapshot.completed_at, first_completed_at);
    }

    #[test]
    fn test_cancelled_keeps_partial_percent() {
        let (mut tracker, rx) = ProgressTracker::new(Uuid::new_v4());
        tracker.set_total(10);
        for _ in 0..3 {
            tracker.record_processed();
        }
        tracker.complete_cancelled("cancelled");
        let snapshot = rx.borrow().clone();
        assert_eq!(snapshot.percent, 30);
        assert!(snapshot.is_complete);
    }
}
