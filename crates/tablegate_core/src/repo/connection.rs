//! Connection collaborator contract consumed by the record gateway.
//!
//! # Responsibility
//! - Describe the minimal SQL primitives a gateway needs from a database
//!   client (lookup, insert, update, delete, identifier escaping).
//! - Keep SQL execution, pooling and escaping outside the gateway.
//!
//! # Invariants
//! - `Selector::All` means "match every row"; it is never an empty match.
//! - `Changes` preserve field order so generated SQL is deterministic.
//! - Implementations surface their own error type unchanged.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::error::Error;

/// One row, keyed by column name.
pub type Record = Map<String, Value>;

/// Boxed error passed through from connection implementations.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Row filter handed to connection primitives.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// Wildcard match over the whole table.
    All,
    /// Equality conjunction over the listed columns.
    Match(Record),
}

impl Selector {
    /// Builds a selector from a filtered query; an empty query matches all rows.
    pub fn from_query(query: Record) -> Self {
        if query.is_empty() {
            Self::All
        } else {
            Self::Match(query)
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

/// Extra clauses for lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Projection list; `None` selects every column.
    pub fields: Option<String>,
    /// Raw SQL appended after the `WHERE` clause (ordering, pagination).
    pub tail: Option<String>,
}

impl FindOptions {
    pub fn with_fields(fields: impl Into<String>) -> Self {
        Self {
            fields: Some(fields.into()),
            tail: None,
        }
    }

    pub fn with_tail(tail: impl Into<String>) -> Self {
        Self {
            fields: None,
            tail: Some(tail.into()),
        }
    }
}

/// Per-column write instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// Overwrite the column with a value.
    Set(Value),
    /// Atomically add the amount to the current column value.
    Increment(Value),
}

/// Ordered column writes for one update statement.
pub type Changes = BTreeMap<String, Assignment>;

/// Builds overwrite-only changes from a record.
pub fn changes_from_record(record: Record) -> Changes {
    record
        .into_iter()
        .map(|(field, value)| (field, Assignment::Set(value)))
        .collect()
}

/// Insert outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertInfo {
    /// Generated primary key, when the backend reports one.
    pub insert_id: Option<i64>,
}

/// Update/delete outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteInfo {
    pub affected_rows: u64,
}

/// Database client used by [`crate::Model`].
///
/// The gateway is generic over this trait, so a missing primitive is a
/// compile-time error. `supports_find_one` stays as the single runtime guard
/// for clients that implement the trait but cannot serve lookups.
pub trait Connection {
    type Error: Error + Send + Sync + 'static;

    /// Escapes an identifier (table or column) for inline SQL.
    fn escape_id(&self, identifier: &str) -> String;

    /// Escapes a literal value for inline SQL.
    fn escape(&self, value: &Value) -> String;

    /// Runs raw SQL with positional parameters and returns all rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Record>, Self::Error>;

    fn find_one(
        &self,
        table: &str,
        selector: &Selector,
        options: &FindOptions,
    ) -> Result<Option<Record>, Self::Error>;

    fn find(
        &self,
        table: &str,
        selector: &Selector,
        options: &FindOptions,
    ) -> Result<Vec<Record>, Self::Error>;

    fn insert(&self, table: &str, record: &Record) -> Result<InsertInfo, Self::Error>;

    fn update(
        &self,
        table: &str,
        selector: &Selector,
        changes: &Changes,
    ) -> Result<WriteInfo, Self::Error>;

    fn delete(&self, table: &str, selector: &Selector) -> Result<WriteInfo, Self::Error>;

    /// Whether lookups can be served at all.
    fn supports_find_one(&self) -> bool {
        true
    }
}
