use quill_error::{QuillError, Result};

use crate::column::{Column, ColumnSpec};
use crate::ddl::{self, DdlOptions};

/// A declared table: a name plus an ordered list of columns.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TableSpec {
    name: String,
    columns: Vec<ColumnSpec>,
}

impl TableSpec {
    /// Declare a table from named column builders, in order.
    ///
    /// Fails when a column name repeats, when no column is primary, when a
    /// primary column is nullable, or when auto-increment is declared on
    /// anything but a single integer primary key.
    pub fn declare<N>(name: impl Into<String>, columns: Vec<(N, Column)>) -> Result<Self>
    where
        N: Into<String>,
    {
        let name = name.into();
        let columns: Vec<ColumnSpec> = columns
            .into_iter()
            .map(|(col_name, col)| col.into_spec(col_name))
            .collect();

        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(QuillError::DuplicateColumn {
                    table: name,
                    column: col.name.clone(),
                });
            }
            if col.primary && col.is_nullable() {
                return Err(QuillError::NullablePrimary {
                    table: name,
                    column: col.name.clone(),
                });
            }
            if col.auto && !(col.primary && col.codec == quill_types::Codec::INTEGER) {
                return Err(QuillError::BadAutoColumn {
                    table: name,
                    column: col.name.clone(),
                });
            }
        }
        let primary_count = columns.iter().filter(|c| c.primary).count();
        if primary_count == 0 {
            return Err(QuillError::NoPrimaryKey { table: name });
        }
        if columns.iter().filter(|c| c.auto).count() > 1 {
            return Err(QuillError::MultipleAutoColumns { table: name });
        }
        // AUTOINCREMENT only exists on a sole INTEGER PRIMARY KEY; under a
        // composite key the inline clause is never emitted, so reject the
        // declaration instead of dropping it.
        if primary_count > 1 {
            if let Some(col) = columns.iter().find(|c| c.auto) {
                return Err(QuillError::BadAutoColumn {
                    table: name,
                    column: col.name.clone(),
                });
            }
        }

        Ok(Self { name, columns })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Columns in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Look up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Names of the primary key columns, in declaration order.
    #[must_use]
    pub fn primary_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Render this table's `CREATE TABLE` statement.
    #[must_use]
    pub fn create_sql(&self, options: &DdlOptions) -> String {
        ddl::create_table_sql(self, options)
    }
}

/// An ordered set of declared tables.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Schema {
    tables: Vec<TableSpec>,
}

impl Schema {
    /// Declare a schema from tables, in order. Table names must be unique.
    pub fn declare(tables: Vec<TableSpec>) -> Result<Self> {
        for (i, table) in tables.iter().enumerate() {
            if tables[..i].iter().any(|t| t.name == table.name) {
                return Err(QuillError::DuplicateTable {
                    name: table.name.clone(),
                });
            }
        }
        Ok(Self { tables })
    }

    /// Tables in declaration order.
    #[must_use]
    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Result<&TableSpec> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| QuillError::unknown_table(name))
    }

    /// Render one `CREATE TABLE` statement per table, in declaration order.
    #[must_use]
    pub fn ddl(&self, options: &DdlOptions) -> Vec<String> {
        self.tables
            .iter()
            .map(|t| t.create_sql(options))
            .collect()
    }
}
