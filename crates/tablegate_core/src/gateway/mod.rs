//! Record gateway: validated CRUD over one table.
//!
//! # Responsibility
//! - Run every operation through the shared pipeline:
//!   format input -> filter -> validate -> (required check) -> execute ->
//!   format output.
//! - Translate list options into ordering/pagination SQL tails.
//!
//! # Invariants
//! - Only registered fields ever reach the connection.
//! - Validation failures abort before any connection call and report every
//!   failing field at once.
//! - Operations hold no per-call state; the model is read-only after
//!   construction.

pub mod accessor;
pub mod error;
pub mod list_options;
pub mod method_table;

use crate::repo::connection::{
    changes_from_record, Assignment, Changes, Connection, FindOptions, Record, Selector,
};
use crate::schema::config::{ConfigError, InputFormatter, ModelConfig, OutputFormatter, Phase};
use crate::schema::field::{FieldError, FieldRegistry};
use accessor::{humanize, FieldAccessor};
use error::{format_error, ModelError, ModelResult};
use list_options::{Direction, ListOptions, OrderBy};
use log::{debug, error, warn};
use serde_json::Value;
use std::collections::BTreeMap;

const COUNT_COLUMN: &str = "c";

/// Table model wrapping a caller-supplied connection.
pub struct Model<C: Connection> {
    conn: C,
    table: String,
    primary: String,
    limit: u32,
    registry: FieldRegistry,
    /// Humanized accessor name (`UserName`) -> field name (`user_name`).
    query_fields: BTreeMap<String, String>,
    required_fields: Vec<String>,
    input: Option<InputFormatter>,
    output: Option<OutputFormatter>,
}

impl<C: Connection> Model<C> {
    /// Builds a model from validated configuration.
    ///
    /// # Errors
    /// - Returns `ConfigError` when `config.validate()` fails.
    pub fn create(config: ModelConfig, conn: C) -> Result<Self, ConfigError> {
        config.validate()?;

        let query_fields = config
            .effective_query_fields()
            .into_iter()
            .map(|field| (humanize(&field), field))
            .collect();

        let mut registry = FieldRegistry::new();
        for (name, spec) in config.fields {
            registry.register(name, spec);
        }

        Ok(Self {
            conn,
            table: config.table,
            primary: config.primary,
            limit: config.limit,
            registry,
            query_fields,
            required_fields: config.required_fields,
            input: config.input,
            output: config.output,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn default_limit(&self) -> u32 {
        self.limit
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    pub fn required_fields(&self) -> &[String] {
        &self.required_fields
    }

    /// Validates one field value.
    pub fn valid(&self, field: &str, value: &Value) -> Result<bool, FieldError> {
        self.registry.validate(field, value)
    }

    /// Drops keys that are not registered fields.
    pub fn filter_data(&self, data: Record) -> Record {
        self.registry.filter(data)
    }

    /// Validates every entry of an already-filtered record.
    pub fn validate_data(&self, data: &Record) -> ModelResult<()> {
        let errors = self.registry.validate_all(data);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ModelError::fields(errors))
        }
    }

    /// Normalizes list options: unknown order fields dropped, page resolved.
    ///
    /// The result always carries an order; without a usable term it sorts by
    /// the primary key ascending.
    pub fn format_list_options(&self, options: &ListOptions) -> ListOptions {
        let (offset, limit) = options.page(self.limit);
        let mut order = self.known_order(&options.order);
        if order.is_empty() {
            order.push(OrderBy::new(self.primary.clone(), Direction::Asc));
        }
        ListOptions {
            order,
            limit: i64::try_from(limit).ok(),
            offset: i64::try_from(offset).ok(),
        }
    }

    /// Current unix time in seconds.
    pub fn timestamp(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }

    /// Fetches the first row matching `query`.
    pub fn get(&self, query: Record) -> ModelResult<Option<Record>> {
        self.ensure_capable("get")?;
        debug!("event=model_get module=gateway status=start table={}", self.table);

        let query = self.prepare(query, Phase::Get)?;
        let selector = Selector::from_query(query);
        let found = self.execute(
            "get",
            self.conn
                .find_one(&self.table, &selector, &FindOptions::default()),
        )?;

        match found {
            Some(record) => Ok(Some(self.format_output(record)?)),
            None => Ok(None),
        }
    }

    /// Lists rows matching `query` with ordering and pagination.
    pub fn list(&self, query: Record, options: &ListOptions) -> ModelResult<Vec<Record>> {
        self.ensure_capable("list")?;
        debug!("event=model_list module=gateway status=start table={}", self.table);

        let query = self.prepare(query, Phase::List)?;
        let selector = Selector::from_query(query);
        let tail = self.list_tail(options);
        let rows = self.execute(
            "list",
            self.conn
                .find(&self.table, &selector, &FindOptions::with_tail(tail)),
        )?;

        rows.into_iter()
            .map(|record| self.format_output(record))
            .collect()
    }

    /// Counts rows matching `query`.
    pub fn count(&self, query: Record) -> ModelResult<u64> {
        self.ensure_capable("count")?;
        debug!("event=model_count module=gateway status=start table={}", self.table);

        let query = self.prepare(query, Phase::Count)?;
        let selector = Selector::from_query(query);
        let projection = format!("COUNT(*) AS {}", self.conn.escape_id(COUNT_COLUMN));
        let row = self.execute(
            "count",
            self.conn
                .find_one(&self.table, &selector, &FindOptions::with_fields(projection)),
        )?;

        let value = row
            .as_ref()
            .and_then(|record| record.get(COUNT_COLUMN))
            .ok_or_else(|| {
                ModelError::UnexpectedResult("count aggregate returned no `c` column".to_string())
            })?;
        count_from_value(value).ok_or_else(|| {
            ModelError::UnexpectedResult(format!("count aggregate is not a count: {value}"))
        })
    }

    /// Inserts one record and returns the generated key, if any.
    pub fn add(&self, data: Record) -> ModelResult<Option<i64>> {
        self.ensure_capable("add")?;
        debug!("event=model_add module=gateway status=start table={}", self.table);

        let data = self.prepare(data, Phase::Add)?;
        let missing: Vec<FieldError> = self
            .required_fields
            .iter()
            .filter(|field| !data.contains_key(field.as_str()))
            .map(|field| FieldError::missing(field.as_str()))
            .collect();
        if !missing.is_empty() {
            warn!(
                "event=model_add module=gateway status=rejected table={} missing_count={}",
                self.table,
                missing.len()
            );
            return Err(ModelError::fields(missing));
        }

        let info = self.execute("add", self.conn.insert(&self.table, &data))?;
        Ok(info.insert_id)
    }

    /// Overwrites fields of matching rows; returns affected row count.
    pub fn update(&self, query: Record, data: Record) -> ModelResult<u64> {
        self.ensure_capable("update")?;
        debug!("event=model_update module=gateway status=start table={}", self.table);

        let query = self.format_input(query, Phase::UpdateQuery)?;
        let data = self.format_input(data, Phase::UpdateData)?;
        let query = self.filter_and_validate(query, Phase::UpdateQuery)?;
        let data = self.filter_and_validate(data, Phase::UpdateData)?;

        let selector = Selector::from_query(query);
        let changes = changes_from_record(data);
        let info = self.execute("update", self.conn.update(&self.table, &selector, &changes))?;
        Ok(info.affected_rows)
    }

    /// Atomically adds `amount` to `field` on matching rows.
    ///
    /// Only `query` is validated; `field` and `amount` are passed through.
    pub fn incr(&self, query: Record, field: &str, amount: impl Into<Value>) -> ModelResult<u64> {
        self.ensure_capable("incr")?;
        debug!(
            "event=model_incr module=gateway status=start table={} field={}",
            self.table, field
        );

        let query = self.prepare(query, Phase::UpdateQuery)?;
        let selector = Selector::from_query(query);
        let mut changes = Changes::new();
        changes.insert(field.to_string(), Assignment::Increment(amount.into()));

        let info = self.execute("incr", self.conn.update(&self.table, &selector, &changes))?;
        Ok(info.affected_rows)
    }

    /// Deletes matching rows; returns affected row count.
    pub fn delete(&self, query: Record) -> ModelResult<u64> {
        self.ensure_capable("delete")?;
        debug!("event=model_delete module=gateway status=start table={}", self.table);

        let query = self.prepare(query, Phase::Delete)?;
        let selector = Selector::from_query(query);
        let info = self.execute("delete", self.conn.delete(&self.table, &selector))?;
        Ok(info.affected_rows)
    }

    /// Quick-query accessor for a field name, e.g. `by("user_name")`.
    pub fn by(&self, field: &str) -> Option<FieldAccessor<'_, C>> {
        self.query_fields
            .iter()
            .find(|(_, name)| name.as_str() == field)
            .map(|(_, name)| FieldAccessor::new(self, name))
    }

    /// Quick-query accessor by humanized name, e.g. `by_name("UserName")`.
    pub fn by_name(&self, name: &str) -> Option<FieldAccessor<'_, C>> {
        self.query_fields
            .get(name)
            .map(|field| FieldAccessor::new(self, field))
    }

    /// Humanized accessor names paired with their field names.
    pub fn query_fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.query_fields
            .iter()
            .map(|(name, field)| (name.as_str(), field.as_str()))
    }

    fn ensure_capable(&self, operation: &'static str) -> ModelResult<()> {
        if self.conn.supports_find_one() {
            return Ok(());
        }
        error!(
            "event=model_{operation} module=gateway status=error table={} error_code=incompatible_connection",
            self.table
        );
        Err(ModelError::IncompatibleConnection { operation })
    }

    fn prepare(&self, record: Record, phase: Phase) -> ModelResult<Record> {
        let record = self.format_input(record, phase)?;
        self.filter_and_validate(record, phase)
    }

    fn format_input(&self, record: Record, phase: Phase) -> ModelResult<Record> {
        match &self.input {
            Some(format) => format(record, phase).map_err(|source| format_error(phase, source)),
            None => Ok(record),
        }
    }

    fn format_output(&self, record: Record) -> ModelResult<Record> {
        match &self.output {
            Some(format) => format(record).map_err(|source| ModelError::Format {
                phase: "output",
                source,
            }),
            None => Ok(record),
        }
    }

    fn filter_and_validate(&self, record: Record, phase: Phase) -> ModelResult<Record> {
        let record = self.filter_data(record);
        if let Err(err) = self.validate_data(&record) {
            warn!(
                "event=model_validate module=gateway status=rejected table={} phase={} error_count={}",
                self.table,
                phase,
                err.field_errors().len()
            );
            return Err(err);
        }
        Ok(record)
    }

    fn execute<T>(&self, operation: &str, result: Result<T, C::Error>) -> ModelResult<T> {
        result.map_err(|err| {
            error!(
                "event=model_{operation} module=gateway status=error table={} error_code=connection_failed error={}",
                self.table, err
            );
            ModelError::connection(err)
        })
    }

    fn known_order(&self, order: &[OrderBy]) -> Vec<OrderBy> {
        order
            .iter()
            .filter(|term| self.registry.contains(&term.field))
            .cloned()
            .collect()
    }

    fn list_tail(&self, options: &ListOptions) -> String {
        let mut tail = String::new();
        let order = self.known_order(&options.order);
        if !order.is_empty() {
            let terms: Vec<String> = order
                .iter()
                .map(|term| {
                    format!(
                        "{} {}",
                        self.conn.escape_id(&term.field),
                        term.direction.as_sql()
                    )
                })
                .collect();
            tail.push_str(" ORDER BY ");
            tail.push_str(&terms.join(", "));
        }
        let (offset, limit) = options.page(self.limit);
        tail.push_str(&format!(" LIMIT {offset}, {limit}"));
        tail
    }
}

fn count_from_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
