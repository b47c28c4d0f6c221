//! DML builders: INSERT / UPDATE / DELETE.
//!
//! Thin validating fronts over the emitter: column names are checked against
//! the table, required columns must be present, and filters are built
//! through the same column-bag closures as queries.

use quill_ast::{ColumnBag, Expr, Query};
use quill_emit::{Emitter, Operation};
use quill_error::{QuillError, Result};
use quill_schema::TableSpec;
use quill_types::Value;

/// Builder for `INSERT INTO table ... VALUES ...`.
#[derive(Clone, Debug)]
pub struct Insert {
    table: TableSpec,
    rows: Vec<Vec<(String, Value)>>,
}

/// Start an INSERT against `table`.
#[must_use]
pub fn insert_into(table: &TableSpec) -> Insert {
    Insert {
        table: table.clone(),
        rows: Vec::new(),
    }
}

impl Insert {
    /// Append one row of `(column, value)` pairs.
    ///
    /// Columns must exist and not repeat; every non-nullable column without
    /// a default or auto-increment must be present. Rows after the first
    /// are reordered to the first row's column order and must name the same
    /// columns.
    pub fn values<N: Into<String>>(mut self, row: Vec<(N, Value)>) -> Result<Self> {
        let row: Vec<(String, Value)> = row
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .collect();

        for (i, (name, _)) in row.iter().enumerate() {
            if self.table.column(name).is_none() {
                return Err(QuillError::unknown_column(name));
            }
            if row[..i].iter().any(|(n, _)| n == name) {
                return Err(QuillError::DuplicateColumn {
                    table: self.table.name().to_owned(),
                    column: name.clone(),
                });
            }
        }
        for column in self.table.columns() {
            let provided = row.iter().any(|(n, _)| n == &column.name);
            let optional =
                column.auto || column.default_sql.is_some() || column.is_nullable();
            if !provided && !optional {
                return Err(QuillError::MissingValue {
                    table: self.table.name().to_owned(),
                    column: column.name.clone(),
                });
            }
        }

        let row = match self.rows.first() {
            None => row,
            Some(first) => {
                if first.len() != row.len() {
                    return Err(QuillError::RowShapeMismatch {
                        table: self.table.name().to_owned(),
                    });
                }
                let mut ordered = Vec::with_capacity(first.len());
                for (name, _) in first {
                    let Some(position) = row.iter().position(|(n, _)| n == name) else {
                        return Err(QuillError::RowShapeMismatch {
                            table: self.table.name().to_owned(),
                        });
                    };
                    ordered.push(row[position].clone());
                }
                ordered
            }
        };
        self.rows.push(row);
        Ok(self)
    }

    /// Lower into an `Insert` operation.
    pub fn build(&self) -> Result<Operation> {
        self.build_with(&mut Emitter::new())
    }

    pub fn build_with(&self, emitter: &mut Emitter) -> Result<Operation> {
        emitter.emit_insert(&self.table, &self.rows)
    }
}

/// Builder for `UPDATE table SET ... [WHERE ...]`.
#[derive(Clone, Debug)]
pub struct Update {
    table: TableSpec,
    assignments: Vec<(String, Value)>,
    filter: Option<Expr>,
}

/// Start an UPDATE against `table`.
#[must_use]
pub fn update(table: &TableSpec) -> Update {
    Update {
        table: table.clone(),
        assignments: Vec::new(),
        filter: None,
    }
}

impl Update {
    /// Add SET assignments. Columns must exist and not repeat.
    pub fn set<N: Into<String>>(mut self, assignments: Vec<(N, Value)>) -> Result<Self> {
        for (name, value) in assignments {
            let name = name.into();
            if self.table.column(&name).is_none() {
                return Err(QuillError::unknown_column(&name));
            }
            if self.assignments.iter().any(|(n, _)| n == &name) {
                return Err(QuillError::DuplicateColumn {
                    table: self.table.name().to_owned(),
                    column: name,
                });
            }
            self.assignments.push((name, value));
        }
        Ok(self)
    }

    /// Add a WHERE condition over the table's columns, AND-composed with
    /// any existing one.
    pub fn filter(mut self, f: impl FnOnce(&ColumnBag) -> Result<Expr>) -> Result<Self> {
        let expr = f(&table_bag(&self.table))?;
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        Ok(self)
    }

    /// Lower into an `Update` operation.
    pub fn build(&self) -> Result<Operation> {
        self.build_with(&mut Emitter::new())
    }

    pub fn build_with(&self, emitter: &mut Emitter) -> Result<Operation> {
        emitter.emit_update(&self.table, &self.assignments, self.filter.as_ref())
    }
}

/// Builder for `DELETE FROM table [WHERE ...]`.
#[derive(Clone, Debug)]
pub struct Delete {
    table: TableSpec,
    filter: Option<Expr>,
}

/// Start a DELETE against `table`.
#[must_use]
pub fn delete_from(table: &TableSpec) -> Delete {
    Delete {
        table: table.clone(),
        filter: None,
    }
}

impl Delete {
    /// Add a WHERE condition, AND-composed with any existing one.
    pub fn filter(mut self, f: impl FnOnce(&ColumnBag) -> Result<Expr>) -> Result<Self> {
        let expr = f(&table_bag(&self.table))?;
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        Ok(self)
    }

    /// Lower into a `Delete` operation.
    pub fn build(&self) -> Result<Operation> {
        self.build_with(&mut Emitter::new())
    }

    pub fn build_with(&self, emitter: &mut Emitter) -> Result<Operation> {
        emitter.emit_delete(&self.table, self.filter.as_ref())
    }
}

/// Column bag over a bare table, for DML filters.
fn table_bag(table: &TableSpec) -> ColumnBag {
    Query::scan(table).bag()
}
