//! Declarative single-table record gateway.
//!
//! A [`Model`] wraps a [`Connection`] plus field declarations and exposes
//! validated CRUD (`get`, `list`, `count`, `add`, `update`, `incr`,
//! `delete`) and per-field quick-query accessors.

pub mod db;
pub mod gateway;
pub mod logging;
pub mod repo;
pub mod schema;

pub use db::{open_db, open_db_in_memory, DbError, DbResult, SqliteConnection};
pub use gateway::accessor::{humanize, FieldAccessor};
pub use gateway::error::{ModelError, ModelResult};
pub use gateway::list_options::{parse_order, Direction, ListOptions, OrderBy};
pub use gateway::method_table::{extend, MethodTable, Output};
pub use gateway::Model;
pub use logging::{default_log_level, init_logging, logging_status};
pub use repo::connection::{
    Assignment, BoxError, Changes, Connection, FindOptions, InsertInfo, Record, Selector,
    WriteInfo,
};
pub use schema::config::{ConfigError, ModelConfig, ModelSchema, Phase};
pub use schema::field::{FieldError, FieldRegistry, FieldSpec, FieldType, Validator};

/// Builds a model over `conn`; shorthand for [`Model::create`].
pub fn create<C: Connection>(config: ModelConfig, conn: C) -> Result<Model<C>, ConfigError> {
    Model::create(config, conn)
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
