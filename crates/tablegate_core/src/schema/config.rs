//! Construction-time model configuration.
//!
//! # Responsibility
//! - Collect table metadata, field declarations and formatting hooks.
//! - Validate configuration before a model is built.
//! - Load declarative schemas from JSON.
//!
//! # Invariants
//! - The primary key is always a registered field and a quick-query field.
//! - Required and quick-query fields name registered fields only.

use crate::repo::connection::{BoxError, Record};
use crate::schema::field::{FieldSpec, FieldType};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

pub const DEFAULT_PRIMARY_KEY: &str = "id";
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Operation stage passed to the input formatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Get,
    List,
    Count,
    Add,
    /// Query half of `update`/`incr`.
    UpdateQuery,
    /// Data half of `update`.
    UpdateData,
    Delete,
}

impl Phase {
    /// Stable tag, e.g. for logging or formatter dispatch.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::List => "list",
            Self::Count => "count",
            Self::Add => "add",
            Self::UpdateQuery => "update1",
            Self::UpdateData => "update2",
            Self::Delete => "delete",
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rewrites an incoming record before filtering.
pub type InputFormatter = Arc<dyn Fn(Record, Phase) -> Result<Record, BoxError> + Send + Sync>;
/// Rewrites each outgoing record.
pub type OutputFormatter = Arc<dyn Fn(Record) -> Result<Record, BoxError> + Send + Sync>;

/// Configuration rejected before model construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    EmptyTable,
    NoFields,
    InvalidLimit,
    UnknownPrimaryKey(String),
    UnknownQueryField(String),
    UnknownRequiredField(String),
    UnknownFieldType { field: String, tag: String },
    InvalidPattern { field: String, message: String },
    Parse(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTable => write!(f, "table name must not be empty"),
            Self::NoFields => write!(f, "at least one field must be declared"),
            Self::InvalidLimit => write!(f, "default limit must be a positive number"),
            Self::UnknownPrimaryKey(field) => {
                write!(f, "primary key `{field}` is not a declared field")
            }
            Self::UnknownQueryField(field) => {
                write!(f, "query field `{field}` is not a declared field")
            }
            Self::UnknownRequiredField(field) => {
                write!(f, "required field `{field}` is not a declared field")
            }
            Self::UnknownFieldType { field, tag } => write!(
                f,
                "field `{field}` has unsupported type `{tag}`; expected string|number|date|*"
            ),
            Self::InvalidPattern { field, message } => {
                write!(f, "field `{field}` has an invalid pattern: {message}")
            }
            Self::Parse(message) => write!(f, "invalid model schema: {message}"),
        }
    }
}

impl Error for ConfigError {}

/// Builder for one table model.
#[derive(Clone)]
pub struct ModelConfig {
    pub(crate) table: String,
    pub(crate) primary: String,
    pub(crate) limit: u32,
    pub(crate) fields: BTreeMap<String, FieldSpec>,
    pub(crate) query_fields: Vec<String>,
    pub(crate) required_fields: Vec<String>,
    pub(crate) input: Option<InputFormatter>,
    pub(crate) output: Option<OutputFormatter>,
}

impl ModelConfig {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary: DEFAULT_PRIMARY_KEY.to_string(),
            limit: DEFAULT_PAGE_SIZE,
            fields: BTreeMap::new(),
            query_fields: Vec::new(),
            required_fields: Vec::new(),
            input: None,
            output: None,
        }
    }

    pub fn primary(mut self, primary: impl Into<String>) -> Self {
        self.primary = primary.into();
        self
    }

    /// Default page size for `list`.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn field(mut self, name: impl Into<String>, spec: impl Into<FieldSpec>) -> Self {
        self.fields.insert(name.into(), spec.into());
        self
    }

    pub fn query_field(mut self, name: impl Into<String>) -> Self {
        self.query_fields.push(name.into());
        self
    }

    pub fn query_fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query_fields.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn required_field(mut self, name: impl Into<String>) -> Self {
        self.required_fields.push(name.into());
        self
    }

    pub fn required_fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_fields.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn input<F>(mut self, format: F) -> Self
    where
        F: Fn(Record, Phase) -> Result<Record, BoxError> + Send + Sync + 'static,
    {
        self.input = Some(Arc::new(format));
        self
    }

    pub fn output<F>(mut self, format: F) -> Self
    where
        F: Fn(Record) -> Result<Record, BoxError> + Send + Sync + 'static,
    {
        self.output = Some(Arc::new(format));
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Validates declaration-level invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table.trim().is_empty() {
            return Err(ConfigError::EmptyTable);
        }
        if self.fields.is_empty() {
            return Err(ConfigError::NoFields);
        }
        if self.limit == 0 {
            return Err(ConfigError::InvalidLimit);
        }
        if !self.fields.contains_key(&self.primary) {
            return Err(ConfigError::UnknownPrimaryKey(self.primary.clone()));
        }
        if let Some(field) = self
            .query_fields
            .iter()
            .find(|field| !self.fields.contains_key(field.as_str()))
        {
            return Err(ConfigError::UnknownQueryField(field.clone()));
        }
        if let Some(field) = self
            .required_fields
            .iter()
            .find(|field| !self.fields.contains_key(field.as_str()))
        {
            return Err(ConfigError::UnknownRequiredField(field.clone()));
        }
        Ok(())
    }

    /// Quick-query fields with the primary key appended, duplicates removed.
    pub(crate) fn effective_query_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        for field in self
            .query_fields
            .iter()
            .chain(std::iter::once(&self.primary))
        {
            if !fields.contains(field) {
                fields.push(field.clone());
            }
        }
        fields
    }
}

impl Debug for ModelConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("table", &self.table)
            .field("primary", &self.primary)
            .field("limit", &self.limit)
            .field("fields", &self.fields)
            .field("query_fields", &self.query_fields)
            .field("required_fields", &self.required_fields)
            .field("input", &self.input.is_some())
            .field("output", &self.output.is_some())
            .finish()
    }
}

/// Field declaration in a JSON schema.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FieldDecl {
    /// `"string" | "number" | "date" | "*"`
    Type(String),
    /// `{ "pattern": "^[a-z]+$" }`
    Pattern { pattern: String },
}

/// Declarative model description, e.g. loaded from a JSON file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSchema {
    pub table: String,
    #[serde(default)]
    pub primary: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
    pub fields: BTreeMap<String, FieldDecl>,
    #[serde(default, alias = "queryFields")]
    pub query_fields: Vec<String>,
    #[serde(default, alias = "requiredFields")]
    pub required_fields: Vec<String>,
}

impl ModelSchema {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Resolves declarations and returns a validated builder.
    pub fn into_config(self) -> Result<ModelConfig, ConfigError> {
        let mut config = ModelConfig::new(self.table)
            .query_fields(self.query_fields)
            .required_fields(self.required_fields);
        if let Some(primary) = self.primary {
            config = config.primary(primary);
        }
        if let Some(limit) = self.limit {
            config = config.limit(limit);
        }

        for (field, decl) in self.fields {
            let spec = match decl {
                FieldDecl::Type(tag) => match FieldType::parse(tag.trim()) {
                    Some(kind) => FieldSpec::Type(kind),
                    None => return Err(ConfigError::UnknownFieldType { field, tag }),
                },
                FieldDecl::Pattern { pattern } => match Regex::new(&pattern) {
                    Ok(regex) => FieldSpec::Pattern(regex),
                    Err(err) => {
                        return Err(ConfigError::InvalidPattern {
                            field,
                            message: err.to_string(),
                        })
                    }
                },
            };
            config = config.field(field, spec);
        }

        config.validate()?;
        Ok(config)
    }
}
