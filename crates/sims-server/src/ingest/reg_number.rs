//! Registration-number generation
//!
//! Registration numbers are the external-facing student identifier:
//! current year, the trailing digits of the epoch clock, and a random
//! numeric suffix. Candidates are checked against both tables that key
//! on the number before being handed out.

use anyhow::{bail, Result};
use chrono::{Datelike, Utc};
use sqlx::PgPool;

/// Attempts before identifier generation is abandoned for a record.
pub const MAX_ATTEMPTS: u32 = 5;

/// Produces collision-checked registration numbers.
#[derive(Debug, Clone)]
pub struct RegNumberGenerator {
    pool: PgPool,
}

impl RegNumberGenerator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Generate a registration number not present in either table that
    /// keys on it, retrying with a fresh candidate up to [`MAX_ATTEMPTS`]
    /// times. Exhaustion fails the single record, not the job.
    pub async fn generate(&self) -> Result<String> {
        for attempt in 1..=MAX_ATTEMPTS {
            let candidate = Self::candidate();
            if !self.exists(&candidate).await? {
                return Ok(candidate);
            }
            tracing::warn!(
                candidate = %candidate,
                attempt,
                "Registration number collision, retrying"
            );
        }
        bail!("exhausted {MAX_ATTEMPTS} attempts generating a unique registration number");
    }

    fn candidate() -> String {
        let now = Utc::now();
        let epoch_tail = now.timestamp().rem_euclid(100_000);
        let suffix = fastrand::u32(100..1000);
        format!("{}{:05}{}", now.year(), epoch_tail, suffix)
    }

    async fn exists(&self, candidate: &str) -> sqlx::Result<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(SELECT 1 FROM students WHERE reg_number = $1)
                OR EXISTS(SELECT 1 FROM student_identities WHERE reg_number = $1)
            "#,
        )
        .bind(candidate)
        .fetch_one(&self.pool)
        .await
    }
}
