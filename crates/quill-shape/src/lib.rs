//! Result shaping: flat driver rows back into nested values.
//!
//! A [`quill_ast::Plan`] mirrors the query's projection; [`shape_all`] and
//! friends walk it against each row, parsing scalar cells through their
//! codecs, decomposing JSON-aggregated columns, collapsing unmatched
//! left-join subtrees to `null`, and enforcing the terminal's cardinality.

use chrono::{DateTime, Utc};
use quill_ast::{Cardinality, JsonShape, Plan};
use quill_error::{QuillError, Result};
use quill_types::{Codec, Row, SqlValue, Value};

/// A shaped result value: scalars plus nested objects and arrays.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Shaped {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
    Date(DateTime<Utc>),
    Json(serde_json::Value),
    Object(Vec<(String, Shaped)>),
    Array(Vec<Shaped>),
}

impl Shaped {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Field lookup on an object value.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Self> {
        match self {
            Self::Object(fields) => fields.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Self]> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Value> for Shaped {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(v) => Self::Bool(v),
            Value::Int(v) => Self::Int(v),
            Value::Real(v) => Self::Real(v),
            Value::Text(v) => Self::Text(v),
            Value::Date(v) => Self::Date(v),
            Value::Json(v) => Self::Json(v),
        }
    }
}

/// Result of shaping under a given cardinality.
#[derive(Clone, Debug, PartialEq)]
pub enum ShapedRows {
    Many(Vec<Shaped>),
    One(Shaped),
    Maybe(Option<Shaped>),
}

/// Shape every row.
pub fn shape_all(rows: &[Row], plan: &Plan) -> Result<Vec<Shaped>> {
    tracing::trace!(rows = rows.len(), "shaping result rows");
    rows.iter().map(|row| shape_row(row, plan)).collect()
}

/// Exactly one row: fails on zero and on more than one.
pub fn shape_one(rows: &[Row], plan: &Plan) -> Result<Shaped> {
    match rows.len() {
        0 => Err(QuillError::EmptyResult),
        1 => shape_row(&rows[0], plan),
        n => Err(QuillError::TooManyResults { count: n }),
    }
}

/// Zero or one row: `None` on zero, fails on more than one.
pub fn shape_maybe_one(rows: &[Row], plan: &Plan) -> Result<Option<Shaped>> {
    match rows.len() {
        0 => Ok(None),
        1 => shape_row(&rows[0], plan).map(Some),
        n => Err(QuillError::TooManyResults { count: n }),
    }
}

/// At least one row: the first.
pub fn shape_first(rows: &[Row], plan: &Plan) -> Result<Shaped> {
    rows.first()
        .ok_or(QuillError::EmptyResult)
        .and_then(|row| shape_row(row, plan))
}

/// The first row when present; never fails on counts.
pub fn shape_maybe_first(rows: &[Row], plan: &Plan) -> Result<Option<Shaped>> {
    rows.first().map(|row| shape_row(row, plan)).transpose()
}

/// Shape under an operation's declared cardinality.
pub fn shape(rows: &[Row], plan: &Plan, cardinality: Cardinality) -> Result<ShapedRows> {
    match cardinality {
        Cardinality::All => shape_all(rows, plan).map(ShapedRows::Many),
        Cardinality::One => shape_one(rows, plan).map(ShapedRows::One),
        Cardinality::MaybeOne => shape_maybe_one(rows, plan).map(ShapedRows::Maybe),
        Cardinality::First => shape_first(rows, plan).map(ShapedRows::One),
        Cardinality::MaybeFirst => shape_maybe_first(rows, plan).map(ShapedRows::Maybe),
    }
}

/// Shape a single row.
pub fn shape_row(row: &Row, plan: &Plan) -> Result<Shaped> {
    match plan {
        Plan::Scalar { column, codec } => {
            let cell = cell(row, column)?;
            Ok(Shaped::from(codec.parse(cell)?))
        }
        Plan::Record { fields } => {
            let mut out = Vec::with_capacity(fields.len());
            for (name, field_plan) in fields {
                out.push((name.clone(), shape_row(row, field_plan)?));
            }
            Ok(Shaped::Object(out))
        }
        Plan::Json { column, shape } => {
            let cell = cell(row, column)?;
            match cell {
                SqlValue::Null => Ok(Shaped::Null),
                SqlValue::Text(text) => {
                    let value: serde_json::Value =
                        serde_json::from_str(text).map_err(|error| {
                            QuillError::codec("json", format!("column {column}: {error}"))
                        })?;
                    shape_json(&value, shape)
                }
                SqlValue::Integer(i) => {
                    shape_json(&serde_json::Value::from(*i), shape)
                }
                SqlValue::Real(r) => shape_json(&serde_json::Value::from(*r), shape),
            }
        }
        Plan::Nullable { inner } => {
            let probes = inner.columns();
            let all_null = probes
                .iter()
                .all(|column| matches!(row.get(*column), Some(SqlValue::Null)));
            if all_null {
                Ok(Shaped::Null)
            } else {
                shape_row(row, inner)
            }
        }
    }
}

fn cell<'a>(row: &'a Row, column: &str) -> Result<&'a SqlValue> {
    row.get(column)
        .ok_or_else(|| QuillError::MissingResultColumn {
            column: column.to_owned(),
        })
}

/// Shape a parsed JSON value, treating it as a row whose keys are the
/// object's keys.
fn shape_json(value: &serde_json::Value, shape: &JsonShape) -> Result<Shaped> {
    match shape {
        JsonShape::Scalar(codec) => {
            let cell = json_to_cell(value, *codec)?;
            Ok(Shaped::from(codec.parse(&cell)?))
        }
        JsonShape::Object(fields) => {
            let object = value.as_object().ok_or_else(|| {
                QuillError::codec("json", format!("expected object, got {value}"))
            })?;
            let mut out = Vec::with_capacity(fields.len());
            for (name, field_shape) in fields {
                let field_value = object.get(name).unwrap_or(&serde_json::Value::Null);
                out.push((name.clone(), shape_json(field_value, field_shape)?));
            }
            Ok(Shaped::Object(out))
        }
        JsonShape::Array(element) => {
            let items = value.as_array().ok_or_else(|| {
                QuillError::codec("json", format!("expected array, got {value}"))
            })?;
            items
                .iter()
                .map(|item| shape_json(item, element))
                .collect::<Result<Vec<_>>>()
                .map(Shaped::Array)
        }
        JsonShape::Nullable(inner) => {
            let collapses = value.is_null()
                || value
                    .as_object()
                    .is_some_and(|o| o.values().all(serde_json::Value::is_null));
            if collapses {
                Ok(Shaped::Null)
            } else {
                shape_json(value, inner)
            }
        }
    }
}

/// Map a JSON leaf onto a SQL cell for codec parsing. Structured values stay
/// JSON text so the `json` codec round-trips them.
fn json_to_cell(value: &serde_json::Value, codec: Codec) -> Result<SqlValue> {
    Ok(match value {
        serde_json::Value::Null => SqlValue::Null,
        serde_json::Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else {
                SqlValue::Real(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => SqlValue::Text(s.clone()),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
            let text = serde_json::to_string(value)
                .map_err(|error| QuillError::codec(codec.name(), error.to_string()))?;
            SqlValue::Text(text)
        }
    })
}
