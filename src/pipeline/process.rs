use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

use crate::pipeline::rules::{RuleKind, RuleSet};

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());

/// One parsed CSV line: column name -> raw string, in file-header order,
/// plus the zero-based row index within the ingestion run.
#[derive(Debug, Clone)]
pub struct RawRow {
    index: usize,
    fields: Vec<(String, String)>,
}

impl RawRow {
    pub fn new(index: usize, fields: Vec<(String, String)>) -> Self {
        Self { index, fields }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Raw value for a column, or None when the column is absent.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

/// A typed field value produced by a successful rule check, or the raw
/// pass-through text for columns without a rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Date(NaiveDate),
    Amount(f64),
}

/// The typed output of successfully processing one row. Column order is
/// preserved from the source row.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    fields: Vec<(String, FieldValue)>,
}

impl NormalizedRecord {
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// JSON object view of the record, for persistence and API responses.
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(name, value)| {
                (
                    name.clone(),
                    serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
                )
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

/// Kinds of row-level data errors. These are data, not failures: they are
/// returned to the caller and never escalate past the pipeline boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    MissingField,
    InvalidEmail,
    InvalidDate,
    InvalidAmount,
}

impl ValidationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationErrorKind::MissingField => "missing_field",
            ValidationErrorKind::InvalidEmail => "invalid_email",
            ValidationErrorKind::InvalidDate => "invalid_date",
            ValidationErrorKind::InvalidAmount => "invalid_amount",
        }
    }
}

/// A single failed check for one column of one row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    pub row: usize,
    pub column: String,
    pub kind: ValidationErrorKind,
    pub message: String,
}

/// Run every rule against the row, in declaration order.
///
/// Pure and deterministic: same row and rules always yield the same result,
/// with no I/O, logging or shared state. Errors are collected rather than
/// short-circuited so one pass reports every problem in the row. The result
/// is all-or-nothing: a record only comes back with zero errors, and columns
/// without a rule pass through as unchanged text.
pub fn process(
    row: &RawRow,
    rules: &RuleSet,
) -> std::result::Result<NormalizedRecord, Vec<ValidationError>> {
    let mut staged: HashMap<String, FieldValue> = HashMap::new();
    let mut errors = Vec::new();

    for rule in rules.rules() {
        match row.get(&rule.column) {
            None => errors.push(ValidationError {
                row: row.index(),
                column: rule.column.clone(),
                kind: ValidationErrorKind::MissingField,
                message: format!("Column '{}' is missing from the row", rule.column),
            }),
            Some(raw) => match check_field(raw, &rule.kind) {
                Ok(value) => {
                    staged.insert(rule.column.clone(), value);
                }
                Err((kind, message)) => errors.push(ValidationError {
                    row: row.index(),
                    column: rule.column.clone(),
                    kind,
                    message,
                }),
            },
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let fields = row
        .iter()
        .map(|(column, raw)| match staged.remove(column) {
            Some(value) => (column.to_string(), value),
            None => (column.to_string(), FieldValue::Text(raw.to_string())),
        })
        .collect();

    Ok(NormalizedRecord { fields })
}

/// Apply one kind-specific check, coercing the raw string on success.
fn check_field(
    raw: &str,
    kind: &RuleKind,
) -> std::result::Result<FieldValue, (ValidationErrorKind, String)> {
    match kind {
        RuleKind::Email => {
            if EMAIL_PATTERN.is_match(raw) {
                Ok(FieldValue::Text(raw.to_lowercase()))
            } else {
                Err((
                    ValidationErrorKind::InvalidEmail,
                    format!("Invalid email format: {raw}"),
                ))
            }
        }
        RuleKind::Date { format } => NaiveDate::parse_from_str(raw, format)
            .map(FieldValue::Date)
            .map_err(|_| {
                (
                    ValidationErrorKind::InvalidDate,
                    format!("Unable to parse date '{raw}' with format '{format}'"),
                )
            }),
        // Amount policy: `.` is the only decimal mark, thousands separators
        // and currency symbols are rejected, non-finite values are rejected,
        // and the parsed value is kept as-is with no rounding.
        RuleKind::Amount => match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(FieldValue::Amount(value)),
            _ => Err((
                ValidationErrorKind::InvalidAmount,
                format!("Invalid amount: {raw}"),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleConfig;

    fn rules(specs: &[(&str, &str)]) -> RuleSet {
        let configs: Vec<RuleConfig> = specs
            .iter()
            .map(|(column, kind)| RuleConfig {
                column: column.to_string(),
                kind: kind.to_string(),
                format: None,
            })
            .collect();
        RuleSet::compile(&configs).unwrap()
    }

    fn row(index: usize, fields: &[(&str, &str)]) -> RawRow {
        RawRow::new(
            index,
            fields
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_valid_row_produces_typed_record() {
        let rules = rules(&[("email", "email"), ("amount", "amount"), ("date", "date")]);
        let row = row(
            0,
            &[
                ("email", "a@b.com"),
                ("amount", "12.50"),
                ("date", "2024-01-15"),
            ],
        );

        let record = process(&row, &rules).unwrap();
        assert_eq!(
            record.get("email"),
            Some(&FieldValue::Text("a@b.com".to_string()))
        );
        assert_eq!(record.get("amount"), Some(&FieldValue::Amount(12.50)));
        assert_eq!(
            record.get("date"),
            Some(&FieldValue::Date(
                NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
            ))
        );
    }

    #[test]
    fn test_invalid_email_yields_single_error() {
        let rules = rules(&[("email", "email"), ("amount", "amount"), ("date", "date")]);
        let row = row(
            0,
            &[
                ("email", "not-an-email"),
                ("amount", "12.50"),
                ("date", "2024-01-15"),
            ],
        );

        let errors = process(&row, &rules).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].column, "email");
        assert_eq!(errors[0].kind, ValidationErrorKind::InvalidEmail);
    }

    #[test]
    fn test_errors_are_collected_in_rule_order() {
        let rules = rules(&[("email", "email"), ("amount", "amount"), ("date", "date")]);
        let row = row(
            0,
            &[
                ("email", "a@b.com"),
                ("amount", "abc"),
                ("date", "2024-13-01"),
            ],
        );

        let errors = process(&row, &rules).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].kind, ValidationErrorKind::InvalidAmount);
        assert_eq!(errors[1].kind, ValidationErrorKind::InvalidDate);
    }

    #[test]
    fn test_missing_column_is_reported() {
        let rules = rules(&[("amount", "amount")]);
        let row = row(0, &[("email", "a@b.com")]);

        let errors = process(&row, &rules).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].column, "amount");
        assert_eq!(errors[0].kind, ValidationErrorKind::MissingField);
    }

    #[test]
    fn test_columns_without_rules_pass_through() {
        let rules = rules(&[("email", "email")]);
        let row = row(0, &[("email", "a@b.com"), ("note", "hello world")]);

        let record = process(&row, &rules).unwrap();
        assert_eq!(
            record.get("note"),
            Some(&FieldValue::Text("hello world".to_string()))
        );
    }

    #[test]
    fn test_record_preserves_column_order() {
        let rules = rules(&[("amount", "amount")]);
        let row = row(0, &[("b", "1"), ("amount", "2.5"), ("a", "3")]);

        let record = process(&row, &rules).unwrap();
        let columns: Vec<&str> = record.iter().map(|(name, _)| name).collect();
        assert_eq!(columns, vec!["b", "amount", "a"]);
    }

    #[test]
    fn test_process_is_idempotent() {
        let rules = rules(&[("email", "email"), ("amount", "amount")]);
        let row = row(3, &[("email", "bad"), ("amount", "xyz")]);

        let first = process(&row, &rules);
        let second = process(&row, &rules);
        assert_eq!(first, second);
    }

    #[test]
    fn test_rows_do_not_affect_each_other() {
        let rules = rules(&[("amount", "amount")]);
        let row_a = row(0, &[("amount", "1.5")]);
        let row_b = row(1, &[("amount", "nope")]);

        // Same per-row results regardless of processing order.
        let a_then_b = (process(&row_a, &rules), process(&row_b, &rules));
        let b_then_a = (process(&row_b, &rules), process(&row_a, &rules));
        assert_eq!(a_then_b.0, b_then_a.1);
        assert_eq!(a_then_b.1, b_then_a.0);
    }

    #[test]
    fn test_rows_process_identically_across_threads() {
        let rules = std::sync::Arc::new(rules(&[("amount", "amount"), ("date", "date")]));
        let row_a = row(0, &[("amount", "10.25"), ("date", "2024-06-01")]);
        let row_b = row(1, &[("amount", "oops"), ("date", "2024-02-30")]);

        let sequential = (process(&row_a, &rules), process(&row_b, &rules));

        let handles: Vec<_> = [row_a, row_b]
            .into_iter()
            .map(|r| {
                let rules = rules.clone();
                std::thread::spawn(move || process(&r, &rules))
            })
            .collect();
        let concurrent: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(concurrent[0], sequential.0);
        assert_eq!(concurrent[1], sequential.1);
    }

    #[test]
    fn test_email_rejects_whitespace_and_bad_domain() {
        let rules = rules(&[("email", "email")]);
        for bad in ["a b@c.com", "a@nodot", "@missing-local.com", ""] {
            let errors = process(&row(0, &[("email", bad)]), &rules).unwrap_err();
            assert_eq!(errors[0].kind, ValidationErrorKind::InvalidEmail, "{bad}");
        }
    }

    #[test]
    fn test_email_is_lowercased() {
        let rules = rules(&[("email", "email")]);
        let record = process(&row(0, &[("email", "A@B.com")]), &rules).unwrap();
        assert_eq!(
            record.get("email"),
            Some(&FieldValue::Text("a@b.com".to_string()))
        );
    }

    #[test]
    fn test_date_must_be_calendar_valid() {
        let rules = rules(&[("date", "date")]);
        let errors = process(&row(0, &[("date", "2024-02-30")]), &rules).unwrap_err();
        assert_eq!(errors[0].kind, ValidationErrorKind::InvalidDate);
    }

    #[test]
    fn test_amount_rejects_non_finite_and_separators() {
        let rules = rules(&[("amount", "amount")]);
        for bad in ["NaN", "inf", "-inf", "1,234.56", "$12.50", ""] {
            let errors = process(&row(0, &[("amount", bad)]), &rules).unwrap_err();
            assert_eq!(errors[0].kind, ValidationErrorKind::InvalidAmount, "{bad}");
        }
    }

    #[test]
    fn test_amount_accepts_signed_values() {
        let rules = rules(&[("amount", "amount")]);
        let record = process(&row(0, &[("amount", "-42.1")]), &rules).unwrap();
        assert_eq!(record.get("amount"), Some(&FieldValue::Amount(-42.1)));
    }
}
