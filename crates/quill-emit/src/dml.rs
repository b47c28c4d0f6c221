//! DML emission: INSERT / UPDATE / DELETE statements.
//!
//! Values are serialized through the target column's codec and bound as
//! named parameters; filters reuse the query expression emitter, including
//! CTE hoisting for subquery predicates.

use std::fmt::Write as _;

use quill_ast::{Cardinality, Expr};
use quill_error::{QuillError, Result};
use quill_schema::TableSpec;
use quill_types::sql_ident::quote_ident;
use quill_types::Value;

use crate::emit::{collect_ctes_from_expr, emit_cte_prefix, emit_expr, reject_aggregate, Cx, Scope};
use crate::op::{Operation, OperationKind, Params};
use crate::Emitter;

impl Emitter {
    /// Emit `INSERT INTO table (cols) VALUES (:params), ...`.
    ///
    /// Each row is an ordered `(column, value)` list; all rows must name the
    /// same columns (the facade builder guarantees this). Parameter labels
    /// are the column names, suffixed `_N` with the row index when more than
    /// one row is inserted.
    pub fn emit_insert(
        &mut self,
        table: &TableSpec,
        rows: &[Vec<(String, Value)>],
    ) -> Result<Operation> {
        let Some(first) = rows.first() else {
            return Err(QuillError::EmptyInsert);
        };
        let multi = rows.len() > 1;
        let mut params = Params::new();

        let mut sql = format!("INSERT INTO {} (", quote_ident(table.name()));
        for (i, (column, _)) in first.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&quote_ident(column));
        }
        sql.push_str(") VALUES ");

        for (row_index, row) in rows.iter().enumerate() {
            if row_index > 0 {
                sql.push_str(", ");
            }
            sql.push('(');
            for (i, (column, value)) in row.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                let spec = table
                    .column(column)
                    .ok_or_else(|| QuillError::unknown_column(column))?;
                let cell = spec.codec.serialize(value)?;
                let label = if multi {
                    format!("{column}_{row_index}")
                } else {
                    column.clone()
                };
                params.bind_shared(&label, cell)?;
                let _ = write!(sql, ":{label}");
            }
            sql.push(')');
        }

        tracing::debug!(rows = rows.len(), params = params.len(), "emitted insert");
        Ok(Operation {
            kind: OperationKind::Insert,
            sql,
            params,
            plan: None,
            cardinality: Cardinality::All,
        })
    }

    /// Emit `UPDATE table SET col = :set_col, ... [WHERE ...]`.
    ///
    /// Assignment parameters are labeled `set_<column>` so they can never
    /// collide with filter externals labeled by column name.
    pub fn emit_update(
        &mut self,
        table: &TableSpec,
        assignments: &[(String, Value)],
        filter: Option<&Expr>,
    ) -> Result<Operation> {
        if assignments.is_empty() {
            return Err(QuillError::EmptyAssignment);
        }
        let (mut sql, mut cx) = self.dml_prefix(filter)?;
        let _ = write!(sql, "UPDATE {} SET ", quote_ident(table.name()));
        for (i, (column, value)) in assignments.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            let spec = table
                .column(column)
                .ok_or_else(|| QuillError::unknown_column(column))?;
            let cell = spec.codec.serialize(value)?;
            let label = format!("set_{column}");
            cx.params.bind_shared(&label, cell)?;
            let _ = write!(sql, "{} = :{label}", quote_ident(column));
        }
        if let Some(filter) = filter {
            let scope = Scope::bare(table.name());
            let text = emit_expr(&mut cx, filter, &scope)?;
            sql.push_str(" WHERE ");
            sql.push_str(&text);
        }
        Ok(Operation {
            kind: OperationKind::Update,
            sql,
            params: cx.params,
            plan: None,
            cardinality: Cardinality::All,
        })
    }

    /// Emit `DELETE FROM table [WHERE ...]`.
    pub fn emit_delete(&mut self, table: &TableSpec, filter: Option<&Expr>) -> Result<Operation> {
        let (mut sql, mut cx) = self.dml_prefix(filter)?;
        let _ = write!(sql, "DELETE FROM {}", quote_ident(table.name()));
        if let Some(filter) = filter {
            let scope = Scope::bare(table.name());
            let text = emit_expr(&mut cx, filter, &scope)?;
            sql.push_str(" WHERE ");
            sql.push_str(&text);
        }
        Ok(Operation {
            kind: OperationKind::Delete,
            sql,
            params: cx.params,
            plan: None,
            cardinality: Cardinality::All,
        })
    }

    /// Validate a DML filter and emit its `WITH` prefix when it references
    /// subquery predicates.
    fn dml_prefix(&mut self, filter: Option<&Expr>) -> Result<(String, Cx<'_>)> {
        let entries = match filter {
            Some(expr) => {
                reject_aggregate(expr, "WHERE")?;
                collect_ctes_from_expr(expr)
            }
            None => Vec::new(),
        };
        let mut cx = Cx {
            ids: &mut self.ids,
            cte_names: std::collections::HashMap::new(),
            params: Params::new(),
        };
        let prefix = emit_cte_prefix(&mut cx, &entries)?;
        Ok((prefix, cx))
    }
}
