//! Typed, composable query builder for SQLite-like databases.
//!
//! Declare a schema, chain clause operations over table scans, and lower
//! the resulting tree into an [`Operation`]: SQL text, named parameters,
//! and a plan for reshaping flat rows into nested values. Any driver that
//! implements the three-call [`Driver`] surface can execute operations;
//! the core itself never touches a database.
//!
//! ```
//! use quill::{query, Column, Expr, QueryExt, TableSpec};
//!
//! # fn main() -> quill::Result<()> {
//! let users = TableSpec::declare(
//!     "users",
//!     vec![
//!         ("id", Column::integer().primary()),
//!         ("name", Column::text()),
//!     ],
//! )?;
//!
//! let op = query(&users)
//!     .filter(|b| Ok(b.col("id")?.gt(Expr::int(0))))?
//!     .all()?;
//! assert!(op.sql.starts_with("SELECT users.*"));
//! # Ok(())
//! # }
//! ```
//!
//! Two caveats worth knowing up front:
//!
//! - Equality lowers to SQLite's `==` except against literal NULL, where it
//!   lowers to `IS`. Comparing two nullable *columns* still uses `==`, so a
//!   NULL-to-NULL comparison is NULL there, matching SQLite, not strict
//!   three-valued purism.
//! - Two anonymous externals never share a parameter slot, even when equal;
//!   share a slot by giving both the same explicit label.

mod dml;
mod driver;

pub use quill_ast::{
    AggregateFn, BinaryOp, Cardinality, ColumnBag, Expr, IdGen, JoinKind, JsonShape, Plan, Query,
    QueryId, SortDirection, UnaryOp,
};
pub use quill_emit::{format_sql, Emitter, Operation, OperationKind, Params, QueryExt};
pub use quill_error::{ErrorKind, QuillError, Result};
pub use quill_schema::{Column, ColumnSpec, DdlOptions, Schema, TableSpec};
pub use quill_shape::{
    shape, shape_all, shape_first, shape_maybe_first, shape_maybe_one, shape_one, shape_row,
    Shaped, ShapedRows,
};
pub use quill_types::{Codec, CodecKind, Row, SqlValue, Value};

pub use dml::{delete_from, insert_into, update, Delete, Insert, Update};
pub use driver::{
    fetch, fetch_all, fetch_first, fetch_maybe_first, fetch_maybe_one, fetch_one, run, Driver,
    RunOutcome, Statement,
};

/// Start a query: `SELECT * FROM table`.
#[must_use]
pub fn query(table: &TableSpec) -> Query {
    Query::scan(table)
}

/// Start a query over another query, promoting it to a CTE.
#[must_use]
pub fn query_from(inner: Query) -> Query {
    Query::from_query(inner)
}

/// One `CreateTable` operation per table of the schema, in declaration
/// order.
#[must_use]
pub fn create_tables(schema: &Schema, options: &DdlOptions) -> Vec<Operation> {
    schema
        .ddl(options)
        .into_iter()
        .map(|sql| Operation {
            kind: OperationKind::CreateTable,
            sql,
            params: Params::new(),
            plan: None,
            cardinality: Cardinality::All,
        })
        .collect()
}
