//! SIMS Server Library
//!
//! HTTP service that ingests delimited student-record files into a
//! relational store.
//!
//! # Overview
//!
//! - **Ingestion pipeline**: streaming, batched CSV processing with
//!   per-record failure isolation, live progress, and cooperative
//!   cancellation (the [`ingest`] module)
//! - **Job registry**: in-memory table of import jobs with retention
//!   and staleness sweeps
//! - **Database**: PostgreSQL via SQLx with a bounded connection pool
//! - **HTTP surface**: thin axum routes for upload, progress, cancel,
//!   and failed-record download
//!
//! # Architecture
//!
//! An upload creates a job in the [`ingest::JobRegistry`]; the file is
//! persisted and a [`ingest::BatchProcessor`] streams it in sequential
//! batches, validating and upserting one record per transaction. Progress
//! snapshots flow through a watch channel per job, so any number of
//! observers can poll or subscribe without touching the processor. A
//! single bad row is written to the per-job failure artifact and never
//! aborts the job.

pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod ingest;
pub mod middleware;

// Re-export commonly used types
pub use error::{AppError, AppResult};
