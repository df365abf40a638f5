//! Quick-query accessors bound to one field.
//!
//! `model.by("user_name")` (or `model.by_name("UserName")`) plays the role of
//! the generated `getByUserName`/`listByUserName`/... family.

use crate::gateway::error::{ModelError, ModelResult};
use crate::gateway::list_options::ListOptions;
use crate::gateway::Model;
use crate::repo::connection::{Connection, Record};
use serde_json::Value;

/// Converts `user_name` / `USER__NAME` into `UserName`.
pub fn humanize(field: &str) -> String {
    field
        .to_lowercase()
        .split('_')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Operations keyed by a single field value.
///
/// Every method fails with `MissingRequiredField` when the value is `None`,
/// before touching the connection.
pub struct FieldAccessor<'m, C: Connection> {
    model: &'m Model<C>,
    field: &'m str,
}

impl<'m, C: Connection> FieldAccessor<'m, C> {
    pub(crate) fn new(model: &'m Model<C>, field: &'m str) -> Self {
        Self { model, field }
    }

    pub fn field(&self) -> &str {
        self.field
    }

    /// Accessor suffix, e.g. `UserName` for `getByUserName`.
    pub fn name(&self) -> String {
        humanize(self.field)
    }

    pub fn get(&self, value: impl Into<Option<Value>>) -> ModelResult<Option<Record>> {
        let query = self.query(value.into())?;
        self.model.get(query)
    }

    pub fn list(
        &self,
        value: impl Into<Option<Value>>,
        options: &ListOptions,
    ) -> ModelResult<Vec<Record>> {
        let query = self.query(value.into())?;
        self.model.list(query, options)
    }

    pub fn count(&self, value: impl Into<Option<Value>>) -> ModelResult<u64> {
        let query = self.query(value.into())?;
        self.model.count(query)
    }

    pub fn update(&self, value: impl Into<Option<Value>>, data: Record) -> ModelResult<u64> {
        let query = self.query(value.into())?;
        self.model.update(query, data)
    }

    pub fn delete(&self, value: impl Into<Option<Value>>) -> ModelResult<u64> {
        let query = self.query(value.into())?;
        self.model.delete(query)
    }

    pub fn incr(
        &self,
        value: impl Into<Option<Value>>,
        field: &str,
        amount: impl Into<Value>,
    ) -> ModelResult<u64> {
        let query = self.query(value.into())?;
        self.model.incr(query, field, amount)
    }

    fn query(&self, value: Option<Value>) -> ModelResult<Record> {
        let Some(value) = value else {
            return Err(ModelError::missing(self.field));
        };
        let mut query = Record::new();
        query.insert(self.field.to_string(), value);
        Ok(query)
    }
}
