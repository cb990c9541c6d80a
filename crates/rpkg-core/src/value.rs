//! Values returned by the R interpreter.

use std::fmt;

use crate::error::{Error, Result};

/// A named field of a record, flattened to strings.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name (empty for unnamed list elements).
    pub name: String,
    /// Field contents, coerced to character.
    pub values: Vec<String>,
}

/// A value produced by an R evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum RValue {
    /// `NULL`.
    Null,
    /// Character vector of length one.
    Str(String),
    /// Character vector of any other length.
    Strings(Vec<String>),
    /// Logical vector; `None` is `NA`.
    Logical(Vec<Option<bool>>),
    /// Numeric vector; `None` is `NA` or non-finite.
    Numeric(Vec<Option<f64>>),
    /// List, with each element flattened to a character vector.
    Record(Vec<Field>),
    /// Anything else, described by its class.
    Other(String),
}

impl RValue {
    /// Contents as a list of strings, for character vectors of any length.
    pub fn as_strings(&self) -> Option<Vec<String>> {
        match self {
            RValue::Str(s) => Some(vec![s.clone()]),
            RValue::Strings(values) => Some(values.clone()),
            _ => None,
        }
    }

    /// Contents as a single string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Look up a record field by name.
    pub fn field(&self, name: &str) -> Option<&[String]> {
        match self {
            RValue::Record(fields) => fields
                .iter()
                .find(|f| f.name == name)
                .map(|f| f.values.as_slice()),
            _ => None,
        }
    }

    /// Number of elements (fields for a record).
    pub fn len(&self) -> usize {
        match self {
            RValue::Null | RValue::Other(_) => 0,
            RValue::Str(_) => 1,
            RValue::Strings(v) => v.len(),
            RValue::Logical(v) => v.len(),
            RValue::Numeric(v) => v.len(),
            RValue::Record(f) => f.len(),
        }
    }

    /// Whether the value has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for RValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RValue::Null => write!(f, "NULL"),
            RValue::Str(s) => write!(f, "\"{}\"", s),
            RValue::Strings(v) => write!(f, "{:?}", v),
            RValue::Logical(v) => write!(f, "{:?}", v),
            RValue::Numeric(v) => write!(f, "{:?}", v),
            RValue::Record(fields) => {
                write!(f, "list(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {:?}", field.name, field.values)?;
                }
                write!(f, ")")
            }
            RValue::Other(class) => write!(f, "<{}>", class),
        }
    }
}

/// Outcome of a single evaluation; exactly one variant holds.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalOutcome {
    /// The expression produced a value.
    Value(RValue),
    /// The guard trapped an interpreter-level error.
    TrappedError(String),
    /// Nothing came back; the engine failed internally.
    Absent,
}

impl EvalOutcome {
    /// Inspect the error tag.
    ///
    /// A trapped error becomes [`Error::Runtime`]; `Absent` is passed on as
    /// `None` so each caller can name the operation that failed.
    pub fn into_guarded(self) -> Result<Option<RValue>> {
        match self {
            EvalOutcome::Value(value) => Ok(Some(value)),
            EvalOutcome::TrappedError(message) => Err(Error::Runtime(format!(
                "R engine threw an error: {}",
                message
            ))),
            EvalOutcome::Absent => Ok(None),
        }
    }

    /// The value, if any, ignoring trapped errors.
    pub fn value(self) -> Option<RValue> {
        match self {
            EvalOutcome::Value(value) => Some(value),
            _ => None,
        }
    }
}
