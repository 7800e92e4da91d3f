//! SIMS Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the SIMS workspace.
//!
//! # Overview
//!
//! This crate provides common functionality used across all SIMS workspace
//! members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Logging**: Centralized `tracing` initialization
//! - **Credentials**: Default credential hashing
//! - **Types**: Shared domain vocabulary (gender, study mode)
//!
//! # Example
//!
//! ```no_run
//! use sims_common::{Result, SimsError};
//! use sims_common::types::Gender;
//!
//! fn parse_gender(raw: &str) -> Result<Gender> {
//!     Gender::from_text(raw).ok_or_else(|| SimsError::Parse(raw.to_string()))
//! }
//! ```

pub mod credential;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{Result, SimsError};
