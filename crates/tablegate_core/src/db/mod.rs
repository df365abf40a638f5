//! SQLite connection adapter for the record gateway.
//!
//! # Responsibility
//! - Open and configure SQLite connections.
//! - Implement the gateway connection contract on top of `rusqlite`.
//!
//! # Invariants
//! - All caller values reach SQLite as bound parameters; only identifiers
//!   and the caller-built `tail` are inlined.
//! - Table schema is owned by the caller; nothing here issues DDL.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod open;
mod sqlite;

pub use open::{open_db, open_db_in_memory};
pub use sqlite::SqliteConnection;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// A JSON value that has no lossless SQLite representation.
    UnsupportedValue(String),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedValue(value) => {
                write!(f, "value `{value}` cannot be stored in SQLite")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedValue(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
