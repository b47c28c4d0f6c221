use quill_error::{QuillError, Result};

use crate::expr::{Expr, Qualifier};
use crate::query::{JoinKind, OutputColumn};

/// The read-only column context passed into builder closures.
///
/// Base columns resolve through [`ColumnBag::col`]; columns of joined
/// subqueries through [`ColumnBag::joined`]. Columns reached through a left
/// join come back with a nullable codec, since the join may not match.
#[derive(Clone, Debug)]
pub struct ColumnBag {
    base: Vec<OutputColumn>,
    joins: Vec<(String, JoinKind, Vec<OutputColumn>)>,
}

impl ColumnBag {
    pub(crate) fn new(
        base: Vec<OutputColumn>,
        joins: Vec<(String, JoinKind, Vec<OutputColumn>)>,
    ) -> Self {
        Self { base, joins }
    }

    /// A base-source column reference.
    pub fn col(&self, name: &str) -> Result<Expr> {
        let column = self
            .base
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| QuillError::unknown_column(name))?;
        Ok(Expr::Column {
            qualifier: Qualifier::Base,
            column: column.name.clone(),
            codec: column.codec,
            shape: column.shape.clone(),
        })
    }

    /// A column of a joined subquery, by the caller's join alias.
    pub fn joined(&self, alias: &str, name: &str) -> Result<Expr> {
        let (_, kind, columns) = self
            .joins
            .iter()
            .find(|(a, _, _)| a == alias)
            .ok_or_else(|| QuillError::UnknownAlias {
                alias: alias.to_owned(),
            })?;
        let column = columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| QuillError::unknown_column(format!("{alias}.{name}")))?;
        let codec = match kind {
            JoinKind::Left => column.codec.nullable(),
            JoinKind::Inner => column.codec,
        };
        Ok(Expr::Column {
            qualifier: Qualifier::Alias(alias.to_owned()),
            column: column.name.clone(),
            codec,
            shape: column.shape.clone(),
        })
    }

    /// Every base column, in source order, as column references.
    #[must_use]
    pub fn base_columns(&self) -> Vec<Expr> {
        self.base
            .iter()
            .map(|column| Expr::Column {
                qualifier: Qualifier::Base,
                column: column.name.clone(),
                codec: column.codec,
                shape: column.shape.clone(),
            })
            .collect()
    }
}
