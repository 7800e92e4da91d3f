//! Reference-table lookups
//!
//! Input files carry denormalized text (marital status, entry year,
//! department, state, LGA) that must be resolved to foreign keys. All
//! matches are case-insensitive exact-text comparisons against the
//! read-only reference tables. Every method is total over its input:
//! a miss either produces a documented fallback or an explicit `None`,
//! never an error, so callers can distinguish "found" from "defaulted"
//! for auditability. Only the database itself can fail.

use sqlx::PgPool;
use uuid::Uuid;

/// Marital status substituted when the input value is blank or matches
/// nothing.
pub const DEFAULT_MARITAL_STATUS: &str = "single";

/// A resolved reference id plus whether it came from a relaxed or
/// defaulted match rather than the scoped lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupHit {
    pub id: Uuid,
    pub fallback: bool,
}

/// Resolves denormalized text fields against the reference tables.
#[derive(Debug, Clone)]
pub struct LookupResolver {
    pool: PgPool,
}

impl LookupResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolve a marital-status value, substituting the fixed default on
    /// a blank or unmatched input. The hit is flagged as a fallback when
    /// the default was used.
    pub async fn marital_status(&self, raw: &str) -> sqlx::Result<LookupHit> {
        let raw = raw.trim();
        if !raw.is_empty() {
            if let Some(id) = self.marital_status_by_name(raw).await? {
                return Ok(LookupHit { id, fallback: false });
            }
            tracing::warn!(
                value = raw,
                default = DEFAULT_MARITAL_STATUS,
                "Unknown marital status, substituting default"
            );
        }

        let id = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM marital_statuses WHERE LOWER(name) = $1",
        )
        .bind(DEFAULT_MARITAL_STATUS)
        .fetch_one(&self.pool)
        .await?;

        Ok(LookupHit { id, fallback: true })
    }

    async fn marital_status_by_name(&self, name: &str) -> sqlx::Result<Option<Uuid>> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM marital_statuses WHERE LOWER(name) = LOWER($1)",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
    }

    /// Resolve an academic session from an entry-year value.
    ///
    /// Matches the literal value first, then the `start/start+1` spelling
    /// built from it, so both "2023" and "2023/2024" resolve to the same
    /// session. A miss is propagated as `None`; whether that is fatal is
    /// the caller's decision.
    pub async fn session_for_entry_year(&self, entry_year: &str) -> sqlx::Result<Option<Uuid>> {
        let entry_year = entry_year.trim();
        if entry_year.is_empty() {
            return Ok(None);
        }

        let range_spelling = entry_year
            .parse::<i32>()
            .map(|start| format!("{start}/{}", start + 1))
            .unwrap_or_else(|_| entry_year.to_string());

        sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM academic_sessions
            WHERE LOWER(name) = LOWER($1) OR LOWER(name) = LOWER($2)
            "#,
        )
        .bind(entry_year)
        .bind(&range_spelling)
        .fetch_optional(&self.pool)
        .await
    }

    /// Resolve a course of study from the department text, falling back
    /// to the programme text when the department is blank.
    pub async fn course_of_study(
        &self,
        department: &str,
        programme: &str,
    ) -> sqlx::Result<Option<Uuid>> {
        let text = if department.trim().is_empty() {
            programme.trim()
        } else {
            department.trim()
        };
        if text.is_empty() {
            return Ok(None);
        }

        sqlx::query_scalar::<_, Uuid>("SELECT id FROM courses WHERE LOWER(name) = LOWER($1)")
            .bind(text)
            .fetch_optional(&self.pool)
            .await
    }

    /// Resolve a state of origin by name. Blank input yields no
    /// identifier rather than an error.
    pub async fn state(&self, name: &str) -> sqlx::Result<Option<Uuid>> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }

        sqlx::query_scalar::<_, Uuid>("SELECT id FROM states WHERE LOWER(name) = LOWER($1)")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
    }

    /// Resolve a local-government-area.
    ///
    /// When a state id is available the LGA is matched on name *and*
    /// state; on a miss, or when no state id was supplied, the name is
    /// retried anywhere in the table and the hit is flagged as a
    /// fallback match.
    pub async fn lga(&self, name: &str, state_id: Option<Uuid>) -> sqlx::Result<Option<LookupHit>> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }

        if let Some(state_id) = state_id {
            let scoped = sqlx::query_scalar::<_, Uuid>(
                "SELECT id FROM lgas WHERE LOWER(name) = LOWER($1) AND state_id = $2",
            )
            .bind(name)
            .bind(state_id)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(id) = scoped {
                return Ok(Some(LookupHit { id, fallback: false }));
            }
        }

        let anywhere = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM lgas WHERE LOWER(name) = LOWER($1) LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(anywhere.map(|id| {
            tracing::warn!(lga = name, "LGA resolved by name only, outside the given state");
            LookupHit { id, fallback: true }
        }))
    }
}
