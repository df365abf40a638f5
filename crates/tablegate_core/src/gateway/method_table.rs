//! Name-addressable method table over a shared model.
//!
//! # Responsibility
//! - Expose every gateway operation and every quick-query accessor as a
//!   bound function reachable by name (`get`, `listByUserName`, ...).
//! - Decode JSON argument lists for dynamic callers (scripting, RPC).
//!
//! # Invariants
//! - The table is built once and never changes afterwards.
//! - All entries share the same underlying model instance (`base`).

use crate::gateway::accessor::{humanize, FieldAccessor};
use crate::gateway::error::{ModelError, ModelResult};
use crate::gateway::list_options::ListOptions;
use crate::gateway::Model;
use crate::repo::connection::{Connection, Record};
use crate::schema::config::{ConfigError, ModelConfig};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Result of a dynamic call.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Record(Option<Record>),
    Records(Vec<Record>),
    Count(u64),
    InsertId(Option<i64>),
    Affected(u64),
    Valid(bool),
    Timestamp(i64),
    ListOptions(ListOptions),
}

type BoundMethod = Box<dyn Fn(&[Value]) -> ModelResult<Output>>;

/// Plain mapping of method names to functions bound to one model.
pub struct MethodTable<C: Connection> {
    base: Arc<Model<C>>,
    methods: BTreeMap<String, BoundMethod>,
}

/// Builds a model and wraps it into a [`MethodTable`].
pub fn extend<C>(config: ModelConfig, conn: C) -> Result<MethodTable<C>, ConfigError>
where
    C: Connection + 'static,
{
    let model = Model::create(config, conn)?;
    Ok(MethodTable::new(Arc::new(model)))
}

impl<C: Connection + 'static> MethodTable<C> {
    pub fn new(base: Arc<Model<C>>) -> Self {
        let mut table = Self {
            base,
            methods: BTreeMap::new(),
        };
        table.bind_operations();
        let fields: Vec<String> = table
            .base
            .query_fields()
            .map(|(_, field)| field.to_string())
            .collect();
        for field in fields {
            table.bind_accessors(field);
        }
        table
    }

    /// Underlying model instance.
    pub fn base(&self) -> &Arc<Model<C>> {
        &self.base
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Sorted method names.
    pub fn names(&self) -> Vec<&str> {
        self.methods.keys().map(String::as_str).collect()
    }

    /// Invokes a method by name.
    ///
    /// # Errors
    /// - `InvalidArguments` for unknown names or malformed argument lists.
    /// - Any error of the invoked operation, unchanged.
    pub fn call(&self, name: &str, args: &[Value]) -> ModelResult<Output> {
        match self.methods.get(name) {
            Some(method) => method(args),
            None => Err(ModelError::InvalidArguments(format!(
                "unknown method `{name}`"
            ))),
        }
    }

    fn bind(&mut self, name: String, method: BoundMethod) {
        self.methods.insert(name, method);
    }

    fn bind_operations(&mut self) {
        let model = Arc::clone(&self.base);
        self.bind(
            "get".to_string(),
            Box::new(move |args: &[Value]| {
                let query = record_arg(args, 0, "query")?;
                Ok(Output::Record(model.get(query)?))
            }),
        );

        let model = Arc::clone(&self.base);
        self.bind(
            "list".to_string(),
            Box::new(move |args: &[Value]| {
                let query = record_arg(args, 0, "query")?;
                let options = options_arg(args, 1)?;
                Ok(Output::Records(model.list(query, &options)?))
            }),
        );

        let model = Arc::clone(&self.base);
        self.bind(
            "count".to_string(),
            Box::new(move |args: &[Value]| {
                let query = record_arg(args, 0, "query")?;
                Ok(Output::Count(model.count(query)?))
            }),
        );

        let model = Arc::clone(&self.base);
        self.bind(
            "add".to_string(),
            Box::new(move |args: &[Value]| {
                let data = record_arg(args, 0, "data")?;
                Ok(Output::InsertId(model.add(data)?))
            }),
        );

        let model = Arc::clone(&self.base);
        self.bind(
            "update".to_string(),
            Box::new(move |args: &[Value]| {
                let query = record_arg(args, 0, "query")?;
                let data = record_arg(args, 1, "data")?;
                Ok(Output::Affected(model.update(query, data)?))
            }),
        );

        let model = Arc::clone(&self.base);
        self.bind(
            "incr".to_string(),
            Box::new(move |args: &[Value]| {
                let query = record_arg(args, 0, "query")?;
                let field = string_arg(args, 1, "field")?;
                let amount = value_arg(args, 2, "amount")?;
                Ok(Output::Affected(model.incr(query, &field, amount)?))
            }),
        );

        let model = Arc::clone(&self.base);
        self.bind(
            "delete".to_string(),
            Box::new(move |args: &[Value]| {
                let query = record_arg(args, 0, "query")?;
                Ok(Output::Affected(model.delete(query)?))
            }),
        );

        let model = Arc::clone(&self.base);
        self.bind(
            "valid".to_string(),
            Box::new(move |args: &[Value]| {
                let field = string_arg(args, 0, "field")?;
                let value = value_arg(args, 1, "value")?;
                let ok = model
                    .valid(&field, &value)
                    .map_err(|err| ModelError::Fields(vec![err]))?;
                Ok(Output::Valid(ok))
            }),
        );

        let model = Arc::clone(&self.base);
        self.bind(
            "validData".to_string(),
            Box::new(move |args: &[Value]| {
                let data = record_arg(args, 0, "data")?;
                model.validate_data(&data)?;
                Ok(Output::Valid(true))
            }),
        );

        let model = Arc::clone(&self.base);
        self.bind(
            "formatListOptions".to_string(),
            Box::new(move |args: &[Value]| {
                let options = options_arg(args, 0)?;
                Ok(Output::ListOptions(model.format_list_options(&options)))
            }),
        );

        let model = Arc::clone(&self.base);
        self.bind(
            "filterData".to_string(),
            Box::new(move |args: &[Value]| {
                let data = record_arg(args, 0, "data")?;
                Ok(Output::Record(Some(model.filter_data(data))))
            }),
        );

        let model = Arc::clone(&self.base);
        self.bind(
            "timestamp".to_string(),
            Box::new(move |_: &[Value]| Ok(Output::Timestamp(model.timestamp()))),
        );
    }

    fn bind_accessors(&mut self, field: String) {
        let suffix = humanize(&field);

        let (model, name) = (Arc::clone(&self.base), field.clone());
        self.bind(
            format!("getBy{suffix}"),
            Box::new(move |args: &[Value]| {
                let accessor = accessor(&model, &name)?;
                Ok(Output::Record(accessor.get(args.first().cloned())?))
            }),
        );

        let (model, name) = (Arc::clone(&self.base), field.clone());
        self.bind(
            format!("listBy{suffix}"),
            Box::new(move |args: &[Value]| {
                let accessor = accessor(&model, &name)?;
                let value = args.first().cloned();
                let options = options_arg(args, 1)?;
                Ok(Output::Records(accessor.list(value, &options)?))
            }),
        );

        let (model, name) = (Arc::clone(&self.base), field.clone());
        self.bind(
            format!("countBy{suffix}"),
            Box::new(move |args: &[Value]| {
                let accessor = accessor(&model, &name)?;
                Ok(Output::Count(accessor.count(args.first().cloned())?))
            }),
        );

        let (model, name) = (Arc::clone(&self.base), field.clone());
        self.bind(
            format!("updateBy{suffix}"),
            Box::new(move |args: &[Value]| {
                let accessor = accessor(&model, &name)?;
                let value = args.first().cloned();
                if value.is_none() {
                    return Err(ModelError::missing(&name));
                }
                let data = record_arg(args, 1, "data")?;
                Ok(Output::Affected(accessor.update(value, data)?))
            }),
        );

        let (model, name) = (Arc::clone(&self.base), field.clone());
        self.bind(
            format!("deleteBy{suffix}"),
            Box::new(move |args: &[Value]| {
                let accessor = accessor(&model, &name)?;
                Ok(Output::Affected(accessor.delete(args.first().cloned())?))
            }),
        );

        let (model, name) = (Arc::clone(&self.base), field);
        self.bind(
            format!("incrBy{suffix}"),
            Box::new(move |args: &[Value]| {
                let accessor = accessor(&model, &name)?;
                let value = args.first().cloned();
                if value.is_none() {
                    return Err(ModelError::missing(&name));
                }
                let target = string_arg(args, 1, "field")?;
                let amount = value_arg(args, 2, "amount")?;
                Ok(Output::Affected(accessor.incr(value, &target, amount)?))
            }),
        );
    }
}

fn accessor<'m, C: Connection>(
    model: &'m Model<C>,
    field: &str,
) -> ModelResult<FieldAccessor<'m, C>> {
    model
        .by(field)
        .ok_or_else(|| ModelError::InvalidArguments(format!("`{field}` is not a query field")))
}

fn value_arg(args: &[Value], index: usize, name: &str) -> ModelResult<Value> {
    args.get(index).cloned().ok_or_else(|| {
        ModelError::InvalidArguments(format!("missing argument #{index} `{name}`"))
    })
}

fn record_arg(args: &[Value], index: usize, name: &str) -> ModelResult<Record> {
    match value_arg(args, index, name)? {
        Value::Object(record) => Ok(record),
        other => Err(ModelError::InvalidArguments(format!(
            "argument #{index} `{name}` must be an object, got {other}"
        ))),
    }
}

fn string_arg(args: &[Value], index: usize, name: &str) -> ModelResult<String> {
    match value_arg(args, index, name)? {
        Value::String(text) => Ok(text),
        other => Err(ModelError::InvalidArguments(format!(
            "argument #{index} `{name}` must be a string, got {other}"
        ))),
    }
}

fn options_arg(args: &[Value], index: usize) -> ModelResult<ListOptions> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(ListOptions::default()),
        Some(value) => serde_json::from_value(value.clone()).map_err(|err| {
            ModelError::InvalidArguments(format!("argument #{index} `options`: {err}"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{options_arg, record_arg, string_arg};
    use serde_json::json;

    #[test]
    fn argument_decoding_rejects_wrong_shapes() {
        let args = [json!({"id": 1}), json!(3)];
        assert!(record_arg(&args, 0, "query").is_ok());
        assert!(record_arg(&args, 1, "data").is_err());
        assert!(string_arg(&args, 1, "field").is_err());
        assert!(record_arg(&args, 5, "query").is_err());
    }

    #[test]
    fn options_default_when_absent_or_null() {
        assert_eq!(options_arg(&[], 1).expect("absent").limit, None);
        assert_eq!(
            options_arg(&[json!({}), json!(null)], 1)
                .expect("null")
                .offset,
            None
        );
        let options =
            options_arg(&[json!({}), json!({"order": "id:desc", "limit": 3})], 1).expect("parsed");
        assert_eq!(options.limit, Some(3));
        assert_eq!(options.order.len(), 1);
        assert!(options_arg(&[json!({}), json!("nope")], 1).is_err());
    }
}
