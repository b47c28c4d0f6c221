use quill_ast::{Cardinality, Plan};
use quill_error::{QuillError, Result};
use quill_types::SqlValue;

/// What kind of statement an operation carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum OperationKind {
    Query,
    CreateTable,
    Insert,
    Update,
    Delete,
}

/// Ordered named-parameter map: label → serialized cell value.
///
/// Insertion order equals first-use order in the emitted SQL. Labels are
/// stored without the `:` prefix.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Params(Vec<(String, SqlValue)>);

impl Params {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a label that may legitimately recur (an explicit external
    /// label). Re-binding with an equal value is a no-op; a different value
    /// is a conflict.
    pub(crate) fn bind_shared(&mut self, label: &str, value: SqlValue) -> Result<()> {
        if let Some((_, existing)) = self.0.iter().find(|(l, _)| l == label) {
            if *existing == value {
                return Ok(());
            }
            return Err(QuillError::ParamConflict {
                label: label.to_owned(),
            });
        }
        self.0.push((label.to_owned(), value));
        Ok(())
    }

    /// Bind a freshly generated label (anonymous externals). The caller
    /// guarantees uniqueness.
    pub(crate) fn bind_fresh(&mut self, label: String, value: SqlValue) {
        self.0.push((label, value));
    }

    #[must_use]
    pub fn get(&self, label: &str) -> Option<&SqlValue> {
        self.0
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v)
    }

    /// Labels in insertion order.
    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        self.0.iter().map(|(l, _)| l.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.0.iter().map(|(l, v)| (l.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = (&'a str, &'a SqlValue);
    type IntoIter = std::vec::IntoIter<(&'a str, &'a SqlValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0
            .iter()
            .map(|(l, v)| (l.as_str(), v))
            .collect::<Vec<_>>()
            .into_iter()
    }
}

/// A fully lowered statement, ready to hand to a driver.
///
/// Serializable: the SQL text, the parameter bindings, and the plan fully
/// describe the statement without any live references.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Operation {
    pub kind: OperationKind,
    pub sql: String,
    pub params: Params,
    /// Present for `Query` operations; DDL and DML return no rows to shape.
    pub plan: Option<Plan>,
    pub cardinality: Cardinality,
}
