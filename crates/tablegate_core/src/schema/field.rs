//! Field specifications and the per-model validation registry.
//!
//! # Responsibility
//! - Resolve heterogeneous field declarations (type tag, pattern, predicate)
//!   into one uniform validator per field.
//! - Filter records down to known fields and validate them in bulk.
//!
//! # Invariants
//! - The registry is read-only once the owning model is built.
//! - Validation never short-circuits: every failing field is reported.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use crate::repo::connection::Record;

/// Uniform validation predicate stored per field.
pub type Validator = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Built-in primitive field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Non-empty string.
    String,
    /// Number or numeric string.
    Number,
    /// String parseable as a date or date-time.
    Date,
    /// Anything goes.
    Any,
}

impl FieldType {
    /// Parses a declaration tag: `string`, `number`, `date` or `*`.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "date" => Some(Self::Date),
            "*" => Some(Self::Any),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Date => "date",
            Self::Any => "*",
        }
    }

    /// Checks one value against this type.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::String => matches!(value, Value::String(text) if !text.is_empty()),
            Self::Number => is_numeric(value),
            Self::Date => matches!(value, Value::String(text) if is_date(text)),
        }
    }
}

/// Field declaration accepted at model construction.
#[derive(Clone)]
pub enum FieldSpec {
    Type(FieldType),
    Pattern(Regex),
    Predicate(Validator),
}

impl FieldSpec {
    pub fn predicate<F>(check: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(check))
    }

    /// Collapses the declaration into a callable validator.
    pub fn into_validator(self) -> Validator {
        match self {
            Self::Type(kind) => Arc::new(move |value: &Value| kind.accepts(value)),
            Self::Pattern(pattern) => {
                Arc::new(move |value: &Value| pattern.is_match(&stringify(value)))
            }
            Self::Predicate(check) => check,
        }
    }
}

impl From<FieldType> for FieldSpec {
    fn from(value: FieldType) -> Self {
        Self::Type(value)
    }
}

impl From<Regex> for FieldSpec {
    fn from(value: Regex) -> Self {
        Self::Pattern(value)
    }
}

impl Debug for FieldSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Type(kind) => write!(f, "Type({})", kind.as_str()),
            Self::Pattern(pattern) => write!(f, "Pattern({})", pattern.as_str()),
            Self::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

/// Per-field validation failure.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldError {
    FieldNotExists { field: String },
    InvalidFieldValue { field: String, value: Value },
    MissingRequiredField { field: String },
}

impl FieldError {
    /// Field the error refers to.
    pub fn field(&self) -> &str {
        match self {
            Self::FieldNotExists { field }
            | Self::InvalidFieldValue { field, .. }
            | Self::MissingRequiredField { field } => field,
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
        }
    }
}

impl Display for FieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FieldNotExists { field } => write!(f, "field `{field}` does not exist"),
            Self::InvalidFieldValue { field, value } => write!(
                f,
                "invalid value `{}` ({}) of field `{field}`",
                stringify(value),
                value_kind(value)
            ),
            Self::MissingRequiredField { field } => {
                write!(f, "missing required field `{field}`")
            }
        }
    }
}

impl Error for FieldError {}

/// Field name to validator mapping for one model.
#[derive(Clone, Default)]
pub struct FieldRegistry {
    validators: BTreeMap<String, Validator>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a field declaration.
    pub fn register(&mut self, name: impl Into<String>, spec: impl Into<FieldSpec>) {
        self.validators
            .insert(name.into(), spec.into().into_validator());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.validators.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Returns sorted field names.
    pub fn field_names(&self) -> Vec<String> {
        self.validators.keys().cloned().collect()
    }

    /// Validates one value for a registered field.
    ///
    /// # Errors
    /// - `FieldNotExists` when `name` was never registered.
    pub fn validate(&self, name: &str, value: &Value) -> Result<bool, FieldError> {
        match self.validators.get(name) {
            Some(check) => Ok(check(value)),
            None => Err(FieldError::FieldNotExists {
                field: name.to_string(),
            }),
        }
    }

    /// Keeps only registered keys, values untouched.
    pub fn filter(&self, record: Record) -> Record {
        record
            .into_iter()
            .filter(|(field, _)| self.contains(field))
            .collect()
    }

    /// Validates every entry and collects all failures.
    ///
    /// Returns an empty vector when the record is valid.
    pub fn validate_all(&self, record: &Record) -> Vec<FieldError> {
        let mut errors = Vec::new();
        for (field, value) in record {
            match self.validate(field, value) {
                Ok(true) => {}
                Ok(false) => errors.push(FieldError::InvalidFieldValue {
                    field: field.clone(),
                    value: value.clone(),
                }),
                Err(err) => errors.push(err),
            }
        }
        errors
    }
}

impl Debug for FieldRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldRegistry")
            .field("fields", &self.field_names())
            .finish()
    }
}

/// Renders a value the way it is matched against patterns.
///
/// Arrays render as their comma-joined elements with `null` as empty text,
/// so `[1, 2]` matches `^1,2$`.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => stringify(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_numeric(value: &Value) -> bool {
    match value {
        Value::Number(_) | Value::Bool(_) => true,
        Value::String(text) => {
            let trimmed = text.trim();
            !trimmed.is_empty()
                && (is_prefixed_integer(trimmed)
                    || trimmed.parse::<f64>().is_ok_and(|parsed| !parsed.is_nan()))
        }
        Value::Null | Value::Array(_) | Value::Object(_) => false,
    }
}

/// Unsigned `0x`/`0o`/`0b` literals, as accepted by numeric coercion.
fn is_prefixed_integer(text: &str) -> bool {
    let radix = match text.get(..2) {
        Some("0x" | "0X") => 16,
        Some("0o" | "0O") => 8,
        Some("0b" | "0B") => 2,
        _ => return false,
    };
    let digits = &text[2..];
    !digits.is_empty() && digits.chars().all(|digit| digit.is_digit(radix))
}

fn is_date(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }
    if DateTime::parse_from_rfc3339(trimmed).is_ok() || DateTime::parse_from_rfc2822(trimmed).is_ok()
    {
        return true;
    }
    DATE_TIME_FORMATS
        .iter()
        .any(|format| NaiveDateTime::parse_from_str(trimmed, format).is_ok())
        || DATE_FORMATS
            .iter()
            .any(|format| NaiveDate::parse_from_str(trimmed, format).is_ok())
}
