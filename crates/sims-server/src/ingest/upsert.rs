//! Insert-or-merge storage writes
//!
//! Each record is written in its own transaction: insert the student and
//! identity pair when no match exists, otherwise fill in only the fields
//! that are still blank on the stored record. Populated fields are never
//! clobbered, which makes re-ingesting the same file safe.

use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::types::{CanonicalRecord, RowOutcome};

/// Stored values consulted by the merge pass.
#[derive(Debug, sqlx::FromRow)]
struct ExistingStudent {
    id: Uuid,
    email: Option<String>,
    study_mode: Option<String>,
    password_hash: Option<String>,
    identity_id: Uuid,
    contact_email: Option<String>,
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Transactionally inserts new records or merges missing fields into
/// existing ones.
#[derive(Debug, Clone)]
pub struct StudentUpserter {
    pool: PgPool,
}

impl StudentUpserter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert the record, or merge blank fields into the existing one.
    ///
    /// The existing student is looked up by either the generated
    /// registration number or the institution matric number, so a
    /// re-upload of the same person with a regenerated number still
    /// matches. Returns whether any write occurred; a merge that finds
    /// every target field populated issues no statement at all.
    pub async fn upsert(&self, record: &CanonicalRecord) -> Result<RowOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let existing = sqlx::query_as::<_, ExistingStudent>(
            r#"
            SELECT s.id, s.email, s.study_mode, s.password_hash,
                   si.id AS identity_id, si.contact_email
            FROM students s
            JOIN student_identities si ON si.student_id = s.id
            WHERE s.reg_number = $1 OR si.matric_number = $2
            "#,
        )
        .bind(&record.student.reg_number)
        .bind(&record.identity.matric_number)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to look up existing student")?;

        let outcome = match existing {
            None => {
                self.insert(&mut tx, record).await?;
                RowOutcome::Written
            },
            Some(existing) => self.merge(&mut tx, record, &existing).await?,
        };

        tx.commit().await.context("Failed to commit transaction")?;
        Ok(outcome)
    }

    /// Insert the student and its identity mapping in the same
    /// transaction; neither row exists without the other.
    async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        record: &CanonicalRecord,
    ) -> Result<()> {
        let student_id = Uuid::new_v4();
        let student = &record.student;

        sqlx::query(
            r#"
            INSERT INTO students (
                id, reg_number, surname, first_name, gender, date_of_birth,
                email, phone, marital_status_id, session_id, course_id,
                state_id, lga_id, study_mode, password_hash,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, NOW(), NOW())
            "#,
        )
        .bind(student_id)
        .bind(&student.reg_number)
        .bind(&student.surname)
        .bind(&student.first_name)
        .bind(student.gender.as_str())
        .bind(student.date_of_birth)
        .bind(&student.email)
        .bind(&student.phone)
        .bind(student.marital_status_id)
        .bind(student.session_id)
        .bind(student.course_id)
        .bind(student.state_id)
        .bind(student.lga_id)
        .bind(student.study_mode.as_str())
        .bind(&student.password_hash)
        .execute(&mut **tx)
        .await
        .context("Failed to insert student")?;

        sqlx::query(
            r#"
            INSERT INTO student_identities (
                id, student_id, reg_number, matric_number, contact_email, created_at
            )
            VALUES ($1, $2, $3, $4, $5, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(&record.identity.reg_number)
        .bind(&record.identity.matric_number)
        .bind(&record.identity.contact_email)
        .execute(&mut **tx)
        .await
        .context("Failed to insert student identity")?;

        Ok(())
    }

    /// Fill in blank fields on the stored record. Each field gets its own
    /// conditional update scoped to rows still blank at write time; a
    /// populated field is never touched.
    async fn merge(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        record: &CanonicalRecord,
        existing: &ExistingStudent,
    ) -> Result<RowOutcome> {
        let mut wrote = false;

        if is_blank(&existing.email) && record.student.email.is_some() {
            sqlx::query(
                r#"
                UPDATE students SET email = $1, updated_at = NOW()
                WHERE id = $2 AND (email IS NULL OR email = '')
                "#,
            )
            .bind(&record.student.email)
            .bind(existing.id)
            .execute(&mut **tx)
            .await
            .context("Failed to merge email")?;
            wrote = true;
        }

        if is_blank(&existing.study_mode) {
            sqlx::query(
                r#"
                UPDATE students SET study_mode = $1, updated_at = NOW()
                WHERE id = $2 AND (study_mode IS NULL OR study_mode = '')
                "#,
            )
            .bind(record.student.study_mode.as_str())
            .bind(existing.id)
            .execute(&mut **tx)
            .await
            .context("Failed to merge study mode")?;
            wrote = true;
        }

        if is_blank(&existing.password_hash) {
            sqlx::query(
                r#"
                UPDATE students SET password_hash = $1, updated_at = NOW()
                WHERE id = $2 AND (password_hash IS NULL OR password_hash = '')
                "#,
            )
            .bind(&record.student.password_hash)
            .bind(existing.id)
            .execute(&mut **tx)
            .await
            .context("Failed to merge credential")?;
            wrote = true;
        }

        if is_blank(&existing.contact_email) && record.identity.contact_email.is_some() {
            sqlx::query(
                r#"
                UPDATE student_identities SET contact_email = $1
                WHERE id = $2 AND (contact_email IS NULL OR contact_email = '')
                "#,
            )
            .bind(&record.identity.contact_email)
            .bind(existing.identity_id)
            .execute(&mut **tx)
            .await
            .context("Failed to merge contact email")?;
            wrote = true;
        }

        if wrote {
            Ok(RowOutcome::Written)
        } else {
            Ok(RowOutcome::NoChange)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_blank() {
        assert!(is_blank(&None));
        assert!(is_blank(&Some(String::new())));
        assert!(is_blank(&Some("   ".to_string())));
        assert!(!is_blank(&Some("value".to_string())));
    }
}
