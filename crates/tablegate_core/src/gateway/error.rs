//! Gateway error type.

use crate::repo::connection::BoxError;
use crate::schema::config::Phase;
use crate::schema::field::FieldError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ModelResult<T> = Result<T, ModelError>;

/// Error returned by every gateway operation.
#[derive(Debug)]
pub enum ModelError {
    /// One or more field-level failures, never empty.
    Fields(Vec<FieldError>),
    /// The connection cannot serve the named operation.
    IncompatibleConnection { operation: &'static str },
    /// Connection failure, passed through unchanged.
    Connection(BoxError),
    /// Input or output formatter failure.
    Format { phase: &'static str, source: BoxError },
    /// The connection returned a shape the gateway cannot interpret.
    UnexpectedResult(String),
    /// Dynamic invocation through a method table with bad name or arguments.
    InvalidArguments(String),
}

impl ModelError {
    pub(crate) fn fields(errors: Vec<FieldError>) -> Self {
        Self::Fields(errors)
    }

    pub(crate) fn missing(field: &str) -> Self {
        Self::Fields(vec![FieldError::missing(field)])
    }

    pub(crate) fn connection<E>(err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::Connection(Box::new(err))
    }

    /// Field errors carried by this error; empty for other kinds.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::Fields(errors) => errors,
            _ => &[],
        }
    }

    pub fn is_field_not_exists(&self) -> bool {
        self.field_errors()
            .iter()
            .any(|err| matches!(err, FieldError::FieldNotExists { .. }))
    }

    pub fn is_invalid_field_value(&self) -> bool {
        self.field_errors()
            .iter()
            .any(|err| matches!(err, FieldError::InvalidFieldValue { .. }))
    }

    pub fn is_missing_required_field(&self) -> bool {
        self.field_errors()
            .iter()
            .any(|err| matches!(err, FieldError::MissingRequiredField { .. }))
    }

    pub fn is_incompatible_connection(&self) -> bool {
        matches!(self, Self::IncompatibleConnection { .. })
    }
}

impl Display for ModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fields(errors) => {
                let rendered: Vec<String> = errors.iter().map(ToString::to_string).collect();
                write!(f, "{}", rendered.join("; "))
            }
            Self::IncompatibleConnection { operation } => write!(
                f,
                "Model.{operation}(): connection does not support record lookups"
            ),
            Self::Connection(err) => write!(f, "{err}"),
            Self::Format { phase, source } => {
                write!(f, "formatter failed during `{phase}`: {source}")
            }
            Self::UnexpectedResult(message) => {
                write!(f, "unexpected connection result: {message}")
            }
            Self::InvalidArguments(message) => write!(f, "invalid arguments: {message}"),
        }
    }
}

impl Error for ModelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Connection(err) => Some(err.as_ref()),
            Self::Format { source, .. } => Some(source.as_ref()),
            Self::Fields(errors) if errors.len() == 1 => Some(&errors[0]),
            _ => None,
        }
    }
}

impl From<Vec<FieldError>> for ModelError {
    fn from(value: Vec<FieldError>) -> Self {
        Self::Fields(value)
    }
}

pub(crate) fn format_error(phase: Phase, source: BoxError) -> ModelError {
    ModelError::Format {
        phase: phase.as_str(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::ModelError;
    use crate::schema::field::FieldError;
    use serde_json::json;

    #[test]
    fn predicates_inspect_field_errors() {
        let err = ModelError::from(vec![
            FieldError::missing("name"),
            FieldError::InvalidFieldValue {
                field: "id".to_string(),
                value: json!("x"),
            },
        ]);
        assert!(err.is_missing_required_field());
        assert!(err.is_invalid_field_value());
        assert!(!err.is_field_not_exists());
        assert_eq!(err.field_errors().len(), 2);
        assert!(err.to_string().contains("missing required field `name`"));
    }

    #[test]
    fn non_field_errors_have_no_field_errors() {
        let err = ModelError::IncompatibleConnection { operation: "get" };
        assert!(err.field_errors().is_empty());
        assert!(err.is_incompatible_connection());
        assert!(err.to_string().contains("Model.get()"));
    }
}
