//! Core types for the ingestion pipeline

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use sims_common::types::{Gender, StudyMode};

/// Required input columns, matched case-insensitively against the file
/// header. Every other column is optional and passed through untouched.
pub const REQUIRED_HEADERS: &[&str] = &[
    "matric number",
    "last name",
    "first name",
    "gender",
    "dob",
    "year of entry",
    "department",
];

/// Header row of an input file.
///
/// Lookup is case-insensitive on the trimmed header name; the original
/// spelling is preserved for the failed-record artifact.
#[derive(Debug)]
pub struct Headers {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Headers {
    pub fn new(names: Vec<String>) -> Self {
        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_lowercase(), i))
            .collect();
        Self { names, index }
    }

    /// Original column names in file order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(&name.trim().to_lowercase()).copied()
    }

    /// Required columns absent from this header row.
    pub fn missing_required(&self) -> Vec<&'static str> {
        REQUIRED_HEADERS
            .iter()
            .filter(|name| !self.index.contains_key(**name))
            .copied()
            .collect()
    }
}

/// One data row of an input file, aligned with its [`Headers`].
#[derive(Debug, Clone)]
pub struct ParsedRow {
    headers: Arc<Headers>,
    values: Vec<String>,
}

impl ParsedRow {
    /// Build a row from a CSV record, padding or truncating ragged rows
    /// to the header width.
    pub fn new(headers: Arc<Headers>, record: &csv::StringRecord) -> Self {
        let width = headers.names().len();
        let mut values: Vec<String> = record.iter().take(width).map(str::to_string).collect();
        values.resize(width, String::new());
        Self { headers, values }
    }

    /// Build a row directly from values, for callers that already hold
    /// them in header order.
    pub fn from_values(headers: Arc<Headers>, mut values: Vec<String>) -> Self {
        values.resize(headers.names().len(), String::new());
        Self { headers, values }
    }

    /// Trimmed value of the named column, or `""` when the column is
    /// absent or blank.
    pub fn field(&self, name: &str) -> &str {
        self.headers
            .position(name)
            .and_then(|i| self.values.get(i))
            .map(|v| v.trim())
            .unwrap_or("")
    }

    /// Raw values in file order, for the failed-record artifact.
    pub fn values(&self) -> &[String] {
        &self.values
    }
}

/// Outcome of handling one row at the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    /// A row was inserted, or an existing row had at least one blank
    /// field filled in.
    Written,
    /// The record already existed with every mergeable field populated.
    NoChange,
}

/// Validated, normalized student record ready for storage.
///
/// The student and identity halves are always written in the same
/// transaction; neither exists without the other.
#[derive(Debug, Clone)]
pub struct CanonicalRecord {
    pub student: NewStudent,
    pub identity: NewIdentity,
}

/// Primary entity: person attributes, resolved foreign keys, and the
/// default credential hash.
#[derive(Debug, Clone)]
pub struct NewStudent {
    pub reg_number: String,
    pub surname: String,
    pub first_name: String,
    pub gender: Gender,
    pub date_of_birth: NaiveDate,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub marital_status_id: Uuid,
    pub session_id: Uuid,
    pub course_id: Uuid,
    pub state_id: Option<Uuid>,
    pub lga_id: Option<Uuid>,
    pub study_mode: StudyMode,
    pub password_hash: String,
}

/// Identifier-mapping entity: the generated registration number, the
/// institution-issued matric number, and a contact echo.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub reg_number: String,
    pub matric_number: String,
    pub contact_email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Arc<Headers> {
        Arc::new(Headers::new(names.iter().map(|s| s.to_string()).collect()))
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let h = headers(&["Matric Number", "Last Name", "DoB"]);
        assert_eq!(h.position("matric number"), Some(0));
        assert_eq!(h.position("MATRIC NUMBER"), Some(0));
        assert_eq!(h.position("dob"), Some(2));
        assert_eq!(h.position("missing"), None);
    }

    #[test]
    fn test_missing_required_reports_absent_columns() {
        let h = headers(&["Matric Number", "Last Name", "First Name", "Gender"]);
        let missing = h.missing_required();
        assert_eq!(missing, vec!["dob", "year of entry", "department"]);
    }

    #[test]
    fn test_missing_required_empty_when_all_present() {
        let h = headers(&[
            "Matric Number",
            "Last Name",
            "First Name",
            "Gender",
            "DoB",
            "Year Of Entry",
            "Department",
            "Email",
        ]);
        assert!(h.missing_required().is_empty());
    }

    #[test]
    fn test_row_field_trims_and_defaults() {
        let h = headers(&["Matric Number", "Email"]);
        let row = ParsedRow::from_values(h, vec!["  A1 ".to_string(), String::new()]);
        assert_eq!(row.field("matric number"), "A1");
        assert_eq!(row.field("email"), "");
        assert_eq!(row.field("absent"), "");
    }

    #[test]
    fn test_ragged_row_is_padded() {
        let h = headers(&["A", "B", "C"]);
        let record = csv::StringRecord::from(vec!["1"]);
        let row = ParsedRow::new(h, &record);
        assert_eq!(row.values(), &["1".to_string(), String::new(), String::new()]);
    }
}
