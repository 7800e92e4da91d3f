//! Row validation and normalization
//!
//! Turns one raw input row into a [`CanonicalRecord`], or fails with a
//! validation error naming the offending field. Validation is
//! fail-first in a fixed order so the failure reason written to the
//! artifact is always the first violation encountered.

use anyhow::Result;
use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use sims_common::credential::hash_default_credential;
use sims_common::types::{Gender, StudyMode};

use super::lookups::LookupResolver;
use super::reg_number::RegNumberGenerator;
use super::types::{CanonicalRecord, NewIdentity, NewStudent, ParsedRow, REQUIRED_HEADERS};

/// Per-record validation failure. The message names the violated field;
/// it becomes the `failure_reason` column of the artifact.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required value for '{0}'")]
    MissingField(&'static str),

    #[error("invalid gender '{0}': expected male or female")]
    InvalidGender(String),

    #[error("unrecognised date of birth '{0}'")]
    InvalidDate(String),

    #[error("invalid email address '{0}'")]
    InvalidEmail(String),

    #[error("invalid phone number '{0}'")]
    InvalidPhone(String),

    #[error("no academic session matches entry year '{0}'")]
    UnknownSession(String),

    #[error("no course of study matches '{0}'")]
    UnknownCourse(String),
}

/// Date formats accepted for the birth-date column, tried in order. The
/// last two stand in for the original system's locale parse.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%B %d, %Y",
    "%d %B %Y",
];

/// Parse a birth date against the accepted formats, normalizing to ISO.
pub fn parse_birth_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}

/// Simple single-`@`, single-dot-domain email shape.
pub fn is_valid_email(raw: &str) -> bool {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    let re = EMAIL_RE
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s.]+\.[^@\s.]+$").expect("valid pattern"));
    re.is_match(raw)
}

/// Phone values may contain only digits, spaces, parentheses, hyphens
/// and a plus sign.
pub fn is_valid_phone(raw: &str) -> bool {
    !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '(' | ')' | '-' | '+'))
}

/// Validates and normalizes raw rows into canonical records, resolving
/// reference fields and generating the registration number.
#[derive(Debug, Clone)]
pub struct RecordTransformer {
    resolver: LookupResolver,
    generator: RegNumberGenerator,
}

impl RecordTransformer {
    pub fn new(resolver: LookupResolver, generator: RegNumberGenerator) -> Self {
        Self { resolver, generator }
    }

    /// Transform one raw row into a canonical record pair.
    ///
    /// Validation failures carry the violated field; database errors
    /// propagate as-is. Either way the error is scoped to this record.
    pub async fn transform(&self, row: &ParsedRow) -> Result<CanonicalRecord> {
        for field in REQUIRED_HEADERS {
            if row.field(field).is_empty() {
                return Err(ValidationError::MissingField(field).into());
            }
        }

        let gender = Gender::from_text(row.field("gender"))
            .ok_or_else(|| ValidationError::InvalidGender(row.field("gender").to_string()))?;

        let date_of_birth = parse_birth_date(row.field("dob"))
            .ok_or_else(|| ValidationError::InvalidDate(row.field("dob").to_string()))?;

        let email = match row.field("email") {
            "" => None,
            raw if is_valid_email(raw) => Some(raw.to_string()),
            raw => return Err(ValidationError::InvalidEmail(raw.to_string()).into()),
        };

        let phone = match row.field("phone") {
            "" => None,
            raw if is_valid_phone(raw) => Some(raw.to_string()),
            raw => return Err(ValidationError::InvalidPhone(raw.to_string()).into()),
        };

        let marital_status = self.resolver.marital_status(row.field("marital status")).await?;

        let session_id = self
            .resolver
            .session_for_entry_year(row.field("year of entry"))
            .await?
            .ok_or_else(|| {
                ValidationError::UnknownSession(row.field("year of entry").to_string())
            })?;

        let course_id = self
            .resolver
            .course_of_study(row.field("department"), row.field("programme"))
            .await?
            .ok_or_else(|| ValidationError::UnknownCourse(row.field("department").to_string()))?;

        let state_id = self.resolver.state(row.field("state of origin")).await?;
        let lga_id = self
            .resolver
            .lga(row.field("lga"), state_id)
            .await?
            .map(|hit| hit.id);

        let reg_number = self.generator.generate().await?;
        let surname = row.field("last name").to_string();
        let password_hash = hash_default_credential(&surname);
        let study_mode = StudyMode::from_duration_text(row.field("programme duration"));

        Ok(CanonicalRecord {
            identity: NewIdentity {
                reg_number: reg_number.clone(),
                matric_number: row.field("matric number").to_string(),
                contact_email: email.clone(),
            },
            student: NewStudent {
                reg_number,
                surname,
                first_name: row.field("first name").to_string(),
                gender,
                date_of_birth,
                email,
                phone,
                marital_status_id: marital_status.id,
                session_id,
                course_id,
                state_id,
                lga_id,
                study_mode,
                password_hash,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_birth_date_iso() {
        assert_eq!(
            parse_birth_date("1995-05-15"),
            NaiveDate::from_ymd_opt(1995, 5, 15)
        );
    }

    #[test]
    fn test_parse_birth_date_day_first() {
        let expected = NaiveDate::from_ymd_opt(1995, 5, 15);
        assert_eq!(parse_birth_date("15-05-1995"), expected);
        assert_eq!(parse_birth_date("15/05/1995"), expected);
    }

    #[test]
    fn test_parse_birth_date_month_first_short() {
        // Day-first parsing rejects a 15th month, so the M/D/YYYY form
        // picks this up.
        assert_eq!(
            parse_birth_date("5/15/1995"),
            NaiveDate::from_ymd_opt(1995, 5, 15)
        );
    }

    #[test]
    fn test_parse_birth_date_human_fallbacks() {
        let expected = NaiveDate::from_ymd_opt(1995, 5, 15);
        assert_eq!(parse_birth_date("May 15, 1995"), expected);
        assert_eq!(parse_birth_date("15 May 1995"), expected);
    }

    #[test]
    fn test_parse_birth_date_rejects_garbage() {
        assert_eq!(parse_birth_date("bad-date"), None);
        assert_eq!(parse_birth_date("1995-13-40"), None);
        assert_eq!(parse_birth_date(""), None);
    }

    #[test]
    fn test_email_shape() {
        assert!(is_valid_email("jdoe@example.com"));
        assert!(is_valid_email("j.doe@example.org"));
        assert!(!is_valid_email("jdoe@example"));
        assert!(!is_valid_email("jdoe@@example.com"));
        assert!(!is_valid_email("jdoe@ex ample.com"));
        assert!(!is_valid_email("not-an-email"));
    }

    #[test]
    fn test_phone_charset() {
        assert!(is_valid_phone("+234 (0) 801-234-5678"));
        assert!(is_valid_phone("08012345678"));
        assert!(!is_valid_phone("0801234x678"));
        assert!(!is_valid_phone(""));
    }
}
