//! Declarative per-kind rule sets and the dry-run validator.
//!
//! Validation never touches the store and may run any number of times on the same input.

use crate::csv::{header_key, parse_csv};
use crate::record::{parse_date, parse_number, RowView};
use crate::sanitize::sanitize_bounded;
use crate::{ImportError, ImportResult};
use serde::Serialize;
use serde_json::Value;

pub const DEFAULT_MAX_FIELD_BYTES: usize = 4 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnRule {
    /// Free text; only the size ceiling applies.
    Text,
    /// Case-insensitive membership in a fixed set.
    OneOf(&'static [&'static str]),
    IntRange { min: i64, max: i64 },
    Number,
    Date,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    /// Normalized header key, e.g. `target_value`.
    pub key: &'static str,
    /// Display name used in messages, e.g. `Target value`.
    pub label: &'static str,
    pub required: bool,
    pub rule: ColumnRule,
    /// Rule failures are errors when set, warnings otherwise.
    pub blocking: bool,
}

impl ColumnSpec {
    pub fn required(key: &'static str, label: &'static str) -> Self {
        Self {
            key,
            label,
            required: true,
            rule: ColumnRule::Text,
            blocking: true,
        }
    }

    pub fn optional(key: &'static str, label: &'static str) -> Self {
        Self {
            required: false,
            ..Self::required(key, label)
        }
    }

    pub fn rule(mut self, rule: ColumnRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn advisory(mut self) -> Self {
        self.blocking = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub columns: Vec<ColumnSpec>,
    /// Per-cell ceiling on the sanitized, JSON-encoded value.
    pub max_field_bytes: usize,
}

impl Schema {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self {
            columns,
            max_field_bytes: DEFAULT_MAX_FIELD_BYTES,
        }
    }

    pub fn with_field_limit(mut self, max_field_bytes: usize) -> Self {
        self.max_field_bytes = max_field_bytes;
        self
    }

    pub fn required_keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().filter(|c| c.required).map(|c| c.key)
    }

    fn knows(&self, key: &str) -> bool {
        self.columns.iter().any(|c| c.key == key)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub row_count: usize,
}

impl ValidationResult {
    fn finish(errors: Vec<String>, warnings: Vec<String>, row_count: usize) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            row_count,
        }
    }

    /// `SchemaValidationFailed` with every blocking error when the check did not pass.
    pub fn into_result(self) -> ImportResult<Self> {
        if self.is_valid {
            Ok(self)
        } else {
            Err(ImportError::SchemaValidationFailed(self.errors))
        }
    }
}

/// Check headers and every data row against `schema`. Row numbers start at 1.
pub fn validate(headers: &[String], rows: &[Vec<String>], schema: &Schema) -> ValidationResult {
    let keys: Vec<String> = headers.iter().map(|h| header_key(h)).collect();
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for required in schema.required_keys() {
        if !keys.iter().any(|k| k == required) {
            errors.push(format!("Missing required column: {required}"));
        }
    }
    for (header, key) in headers.iter().zip(&keys) {
        if !schema.knows(key) {
            warnings.push(format!("Unrecognized column '{header}' will be ignored"));
        }
    }

    let present: Vec<&ColumnSpec> = schema
        .columns
        .iter()
        .filter(|c| keys.iter().any(|k| k == c.key))
        .collect();

    for (idx, row) in rows.iter().enumerate() {
        let view = RowView::new(idx + 1, &keys, row);
        for column in &present {
            if let Some(issue) = check_cell(&view, column, schema.max_field_bytes) {
                let message = format!("Row {}: {}", view.row, issue.message);
                if issue.blocking {
                    errors.push(message);
                } else {
                    warnings.push(message);
                }
            }
        }
    }

    ValidationResult::finish(errors, warnings, rows.len())
}

/// Parse and validate in one step; a malformed file becomes a single blocking error.
pub async fn validate_text(text: &str, schema: &Schema) -> ValidationResult {
    match parse_csv(text).await {
        Ok(parsed) => validate(&parsed.headers, &parsed.rows, schema),
        Err(err) => ValidationResult::finish(vec![err.to_string()], Vec::new(), 0),
    }
}

struct CellIssue {
    message: String,
    blocking: bool,
}

impl CellIssue {
    fn blocking(message: String) -> Option<Self> {
        Some(Self {
            message,
            blocking: true,
        })
    }
}

fn check_cell(
    view: &RowView<'_>,
    column: &ColumnSpec,
    max_field_bytes: usize,
) -> Option<CellIssue> {
    let raw = view.get(column.key).unwrap_or_default();
    let value = match sanitize_bounded(&Value::String(raw.to_string()), max_field_bytes) {
        Ok(Value::String(clean)) => clean,
        Ok(_) => String::new(),
        Err(ImportError::PayloadTooLarge { size, limit }) => {
            return CellIssue::blocking(format!(
                "{} exceeds maximum size ({size} > {limit} bytes)",
                column.label
            ));
        }
        Err(err) => return CellIssue::blocking(format!("{}: {err}", column.label)),
    };
    let value = value.trim();

    if value.is_empty() {
        return column.required.then(|| CellIssue {
            message: format!("{} is required", column.label),
            blocking: true,
        });
    }

    let message = match &column.rule {
        ColumnRule::Text => return None,
        ColumnRule::OneOf(allowed) => {
            let lower = value.to_lowercase();
            if allowed.iter().any(|a| *a == lower) {
                return None;
            }
            format!(
                "Invalid {} '{value}'. Must be one of: {}",
                column.key,
                allowed.join(", ")
            )
        }
        ColumnRule::IntRange { min, max } => match value.parse::<i64>() {
            Ok(n) if (*min..=*max).contains(&n) => return None,
            _ => format!(
                "{} must be an integer between {min} and {max}, got '{value}'",
                column.label
            ),
        },
        ColumnRule::Number => {
            if parse_number(value).is_some() {
                return None;
            }
            format!("{} '{value}' is not a valid number", column.label)
        }
        ColumnRule::Date => {
            if parse_date(value).is_some() {
                return None;
            }
            format!("{} '{value}' is not a valid date", column.label)
        }
    };

    Some(CellIssue {
        message: if column.blocking {
            message
        } else {
            format!("{message} and will be ignored")
        },
        blocking: column.blocking,
    })
}
